use serde::Serialize;
use std::time::Duration;

use crate::config::MailConfig;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Sends donation thank-you e-mails through Resend. Without an API key every
/// send is a logged no-op.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    config: MailConfig,
    endpoint: String,
    timeout: Duration,
}

impl Mailer {
    pub fn new(config: MailConfig) -> Self {
        Mailer {
            client: reqwest::Client::new(),
            config,
            endpoint: RESEND_ENDPOINT.to_string(),
            timeout: SEND_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn donation_email(&self, to: &str, name: &str, amount: f64, project_name: Option<&str>) -> Email {
        let org = &self.config.organization;
        let project = project_name
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!(" - {}", escape_html(p)))
            .unwrap_or_default();
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Thank You for Your Donation!</h2>
  <p>Dear {name},</p>
  <p>Thank you for your generous donation of {symbol}{amount} to the {org}{project}.</p>
  <p>Your support helps us continue our mission of empowering communities and creating lasting positive change.</p>
  <p>We will keep you updated on the impact of your contribution at <a href="{site}">{site}</a>.</p>
  <br/>
  <p>Best regards,</p>
  <p>The {org} Team</p>
</div>"#,
            name = escape_html(name),
            symbol = self.config.currency_symbol,
            amount = format_amount(amount),
            org = escape_html(org),
            project = project,
            site = escape_html(&self.config.site_url),
        );
        Email {
            to: to.to_string(),
            subject: format!("Thank You for Your Donation - {}", org),
            html,
        }
    }

    pub async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            tracing::debug!("mail disabled, not sending to {}", email.to);
            return Ok(());
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .bearer_auth(api_key)
            .json(&ResendRequest {
                from: &self.config.from,
                to: &email.to,
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("mail provider returned {}: {}", status, body);
        }
        Ok(())
    }
}

/// Groups the integer part by thousands; cents are shown only when present.
pub fn format_amount(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    match cents % 100 {
        0 => format!("{}{}", sign, grouped),
        frac => format!("{}{}.{:02}", sign, grouped, frac),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mail_config(api_key: Option<&str>) -> MailConfig {
        MailConfig {
            api_key: api_key.map(str::to_string),
            from: "Foundation <no-reply@example.org>".into(),
            site_url: "https://example.org".into(),
            organization: "Lynda Mbah Foundation".into(),
            currency_symbol: "₦".into(),
        }
    }

    #[test]
    fn amounts_are_grouped() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(12500.0), "12,500");
        assert_eq!(format_amount(1234567.5), "1,234,567.50");
    }

    #[test]
    fn donation_email_mentions_project_and_escapes_names() {
        let mailer = Mailer::new(mail_config(None));
        let email = mailer.donation_email("ada@example.com", "Ada <script>", 12500.0, Some("Clean Water"));
        assert_eq!(email.subject, "Thank You for Your Donation - Lynda Mbah Foundation");
        assert!(email.html.contains("₦12,500 to the Lynda Mbah Foundation - Clean Water."));
        assert!(email.html.contains("Dear Ada &lt;script&gt;,"));

        let general = mailer.donation_email("ada@example.com", "Ada", 50.0, None);
        assert!(general.html.contains("₦50 to the Lynda Mbah Foundation."));
    }

    #[tokio::test]
    async fn disabled_mailer_sends_nothing() {
        let mailer = Mailer::new(mail_config(None));
        assert!(!mailer.enabled());
        let email = mailer.donation_email("a@b.co", "A", 1.0, None);
        mailer.send(&email).await.expect("no-op");
    }

    #[tokio::test]
    async fn send_posts_to_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer re_test"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = Mailer::new(mail_config(Some("re_test"))).with_endpoint(&server.uri());
        let email = mailer.donation_email("a@b.co", "A", 1.0, None);
        mailer.send(&email).await.expect("sent");
    }

    #[tokio::test]
    async fn provider_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad sender"))
            .mount(&server)
            .await;

        let mailer = Mailer::new(mail_config(Some("re_test"))).with_endpoint(&server.uri());
        let email = mailer.donation_email("a@b.co", "A", 1.0, None);
        let err = mailer.send(&email).await.unwrap_err();
        assert!(err.to_string().contains("422"));
    }

    #[tokio::test]
    async fn hung_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let mailer = Mailer::new(mail_config(Some("re_test")))
            .with_endpoint(&server.uri())
            .with_timeout(Duration::from_millis(100));
        let email = mailer.donation_email("a@b.co", "A", 1.0, None);
        let started = std::time::Instant::now();
        assert!(mailer.send(&email).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
