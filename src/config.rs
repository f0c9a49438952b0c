use anyhow::{anyhow, bail, Context};
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Sqlite { path: String },
    Supabase { url: String, anon_key: String },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_key: Option<String>,
    pub from: String,
    pub site_url: String,
    pub organization: String,
    pub currency_symbol: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    pub seed_demo_projects: bool,
    pub bind_addr: SocketAddr,
    pub static_dir: String,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub jwt_secret: String,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub mail: MailConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests can feed a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Values left empty in a .env file count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| get(*k));

        let use_supabase = match first(&["USE_SUPABASE", "VITE_USE_SUPABASE"]) {
            Some(v) => parse_bool(&v).with_context(|| "USE_SUPABASE")?,
            None => false,
        };

        let backend = if use_supabase {
            let url = first(&["SUPABASE_URL", "VITE_SUPABASE_URL"])
                .ok_or_else(|| anyhow!("SUPABASE_URL must be set when USE_SUPABASE=true"))?;
            url::Url::parse(&url).with_context(|| format!("SUPABASE_URL is not a valid URL: {}", url))?;
            let anon_key = first(&["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"])
                .ok_or_else(|| anyhow!("SUPABASE_ANON_KEY must be set when USE_SUPABASE=true"))?;
            Backend::Supabase { url, anon_key }
        } else {
            Backend::Sqlite {
                path: get("SQLITE_PATH").unwrap_or_else(|| "db/database.sqlite".to_string()),
            }
        };

        let seed_demo_projects = match get("SEED_DEMO_PROJECTS") {
            Some(v) => parse_bool(&v).with_context(|| "SEED_DEMO_PROJECTS")?,
            None => true,
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be host:port")?;

        let production = get("RUST_ENV").as_deref() == Some("production");

        let allowed_origins: Vec<String> = get("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let allowed_origins = if allowed_origins.is_empty() {
            if production {
                bail!("ALLOWED_ORIGINS must be set in production");
            }
            vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ]
        } else {
            allowed_origins
        };

        let rate_limit_per_second = get("RATE_LIMIT_PER_SECOND")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(2);
        let rate_limit_burst = get("RATE_LIMIT_BURST")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(30);

        let jwt_secret = get("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;

        let mail = MailConfig {
            api_key: get("RESEND_API_KEY"),
            from: get("EMAIL_FROM").unwrap_or_else(|| "Foundation <no-reply@localhost>".to_string()),
            site_url: get("SITE_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            organization: get("ORGANIZATION_NAME").unwrap_or_else(|| "Lynda Mbah Foundation".to_string()),
            currency_symbol: get("CURRENCY_SYMBOL").unwrap_or_else(|| "₦".to_string()),
        };

        Ok(Config {
            backend,
            seed_demo_projects,
            bind_addr,
            static_dir: get("STATIC_DIR").unwrap_or_else(|| "static".to_string()),
            production,
            allowed_origins,
            rate_limit_per_second,
            rate_limit_burst,
            jwt_secret,
            admin_username: get("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
            admin_password: get("ADMIN_PASSWORD"),
            mail,
        })
    }

    /// Development configuration over an SQLite file (or `:memory:`).
    pub fn for_sqlite(path: &str) -> Self {
        Config {
            backend: Backend::Sqlite { path: path.to_string() },
            seed_demo_projects: true,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            static_dir: "static".to_string(),
            production: false,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_per_second: 2,
            rate_limit_burst: 30,
            jwt_secret: "development-secret".to_string(),
            admin_username: "admin".to_string(),
            admin_password: None,
            mail: MailConfig {
                api_key: None,
                from: "Foundation <no-reply@localhost>".to_string(),
                site_url: "http://localhost:8080".to_string(),
                organization: "Lynda Mbah Foundation".to_string(),
                currency_symbol: "₦".to_string(),
            },
        }
    }
}

pub fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{}'", other)),
    }
}
