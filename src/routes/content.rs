use axum::{
    extract::Path,
    response::{IntoResponse, Json as AxumJson},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const SITE_CONTENT: &str = include_str!("../../content/site.json");

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Program {
    pub title: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewsItem {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub date: NaiveDate,
    pub author: String,
    pub category: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImpactFigure {
    pub label: String,
    pub count: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SiteContent {
    pub organization: String,
    pub mission: String,
    pub vision: String,
    pub programs: Vec<Program>,
    pub team: Vec<TeamMember>,
    pub news: Vec<NewsItem>,
    pub impact: Vec<ImpactFigure>,
}

static CONTENT: OnceLock<Option<SiteContent>> = OnceLock::new();

fn site_content() -> Option<&'static SiteContent> {
    CONTENT
        .get_or_init(|| match serde_json::from_str::<SiteContent>(SITE_CONTENT) {
            Ok(mut content) => {
                content.news.sort_by(|a, b| b.date.cmp(&a.date));
                Some(content)
            }
            Err(e) => {
                tracing::error!("Bundled site content is invalid: {}", e);
                None
            }
        })
        .as_ref()
}

pub async fn get_content() -> impl IntoResponse {
    match site_content() {
        Some(content) => AxumJson(content).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Content unavailable").into_response(),
    }
}

pub async fn get_news_item(Path(slug): Path<String>) -> impl IntoResponse {
    match site_content().and_then(|c| c.news.iter().find(|n| n.slug == slug)) {
        Some(item) => AxumJson(item).into_response(),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
