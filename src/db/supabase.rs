use reqwest::header::HeaderMap;
use reqwest::{header, RequestBuilder, Response};
use serde_json::{Map, Value};

use super::query::{postgrest_filters, Filter, Query, Table};
use super::StoreError;

const MAX_INCREMENT_ATTEMPTS: usize = 3;
/// Rows requested per GET. Supabase caps responses at `max-rows` (1000 by default).
const PAGE_SIZE: usize = 1000;

/// Hosted store: PostgREST endpoints of a Supabase project.
#[derive(Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
    page_size: usize,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent("FoundationSite/1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(SupabaseStore {
            client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            page_size: PAGE_SIZE,
        })
    }

    fn request(&self, method: reqwest::Method, table: Table) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table.name()))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
    }

    /// Pages through the result with `limit`/`offset` until the query's own
    /// limit, the server-reported total, or a short page is reached.
    pub async fn select(&self, q: &Query) -> Result<Vec<Value>, StoreError> {
        let base = paged_pairs(q);
        let wanted = q.row_limit();
        let mut rows: Vec<Value> = Vec::new();
        loop {
            let page_size = match wanted {
                Some(w) => w.saturating_sub(rows.len()).min(self.page_size),
                None => self.page_size,
            };
            if page_size == 0 {
                break;
            }
            let mut pairs = base.clone();
            pairs.push(("limit".to_string(), page_size.to_string()));
            pairs.push(("offset".to_string(), rows.len().to_string()));

            let resp = self
                .request(reqwest::Method::GET, q.table())
                .header("Prefer", "count=exact")
                .query(&pairs)
                .send()
                .await?;
            let total = content_range_total(resp.headers());
            let page = read_rows(resp).await?;
            let fetched = page.len();
            rows.extend(page);

            let done = match total {
                Some(total) => rows.len() >= total,
                None => fetched < page_size,
            };
            if done || fetched == 0 {
                break;
            }
            tracing::debug!(table = q.table().name(), fetched = rows.len(), ?total, "fetching next page");
        }
        Ok(rows)
    }

    pub async fn insert(&self, table: Table, rows: Vec<Map<String, Value>>) -> Result<Vec<Value>, StoreError> {
        check_rows(table, &rows)?;
        let resp = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        read_rows(resp).await
    }

    pub async fn upsert(&self, table: Table, rows: Vec<Map<String, Value>>) -> Result<usize, StoreError> {
        check_rows(table, &rows)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let resp = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(rows.len())
    }

    pub async fn update(
        &self,
        table: Table,
        changes: Map<String, Value>,
        filters: Vec<Filter>,
    ) -> Result<Vec<Value>, StoreError> {
        super::query::checked_columns(table, &changes)?;
        if filters.is_empty() {
            return Err(StoreError::InvalidQuery(format!(
                "update of {} without a filter",
                table.name()
            )));
        }
        let resp = self
            .request(reqwest::Method::PATCH, table)
            .query(&postgrest_filters(&filters))
            .header("Prefer", "return=representation")
            .json(&changes)
            .send()
            .await?;
        read_rows(resp).await
    }

    /// Read-modify-write guarded by the previously read value, so two
    /// concurrent donations cannot overwrite each other's increment.
    pub async fn increment_raised(&self, project_id: &str, amount: f64) -> Result<Option<f64>, StoreError> {
        for attempt in 1..=MAX_INCREMENT_ATTEMPTS {
            let q = Query::from(Table::Projects)
                .select("raised")?
                .eq("id", project_id)?
                .limit(1);
            let rows = self.select(&q).await?;
            let Some(current) = rows.first() else {
                return Ok(None);
            };
            let previous = current.get("raised").cloned().unwrap_or(Value::Null);
            let next = previous.as_f64().unwrap_or(0.0) + amount;

            let mut changes = Map::new();
            changes.insert("raised".into(), Value::from(next));
            changes.insert("updated_at".into(), Value::from(chrono::Utc::now().to_rfc3339()));
            let filters = vec![
                Filter::eq(Table::Projects, "id", project_id)?,
                Filter::eq(Table::Projects, "raised", previous)?,
            ];
            let updated = self.update(Table::Projects, changes, filters).await?;
            if let Some(row) = updated.first() {
                return Ok(row.get("raised").and_then(Value::as_f64).or(Some(next)));
            }
            tracing::debug!(project_id, attempt, "raised total changed underneath, retrying");
        }
        Err(StoreError::Conflict(format!(
            "raised total of project {} kept changing",
            project_id
        )))
    }
}

/// Query pairs without `limit`, ordered by `id` last so offsets are stable.
fn paged_pairs(q: &Query) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = q
        .to_postgrest()
        .into_iter()
        .filter(|(k, _)| k != "limit")
        .collect();
    match pairs.iter_mut().find(|(k, _)| k == "order") {
        Some((_, order)) if !order.starts_with("id.") => order.push_str(",id.asc"),
        Some(_) => {}
        None => pairs.push(("order".to_string(), "id.asc".to_string())),
    }
    pairs
}

/// Total row count from `Content-Range: 0-999/2300`; `None` when the server
/// reports `*` or omits the header.
fn content_range_total(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit_once('/')?
        .1
        .parse()
        .ok()
}

fn check_rows(table: Table, rows: &[Map<String, Value>]) -> Result<(), StoreError> {
    for row in rows {
        super::query::checked_columns(table, row)?;
    }
    Ok(())
}

async fn ensure_success(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_rows(resp: Response) -> Result<Vec<Value>, StoreError> {
    let resp = ensure_success(resp).await?;
    let body = resp.text().await?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(&body)? {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        single => Ok(vec![single]),
    }
}
