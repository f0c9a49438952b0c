use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

pub mod models;
pub mod query;
pub mod sqlite;
pub mod supabase;

use crate::config::{Backend, Config};
use models::{
    ContactMessage, Donation, DonationStatus, NewContactMessage, NewDonation, NewProject, Project,
    ProjectStatus, ProjectUpdate, Stats,
};
use query::{Filter, Query, Table};
use sqlite::SqliteStore;
use supabase::SupabaseStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("supabase returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown column '{column}' for table {table}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence backend; both variants answer the same query surface.
#[derive(Clone)]
pub enum Store {
    Sqlite(SqliteStore),
    Supabase(SupabaseStore),
}

pub type DbPool = Store;

pub async fn init_pool(config: &Config) -> anyhow::Result<DbPool> {
    let store = match &config.backend {
        Backend::Sqlite { path } => Store::Sqlite(SqliteStore::open(path)?),
        Backend::Supabase { url, anon_key } => Store::Supabase(SupabaseStore::new(url, anon_key)?),
    };
    tracing::info!("Using {} store", store.backend_name());
    Ok(store)
}

impl Store {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Sqlite(_) => "sqlite",
            Store::Supabase(_) => "supabase",
        }
    }

    pub async fn select(&self, q: &Query) -> Result<Vec<Value>, StoreError> {
        match self {
            Store::Sqlite(s) => s.select(q).await,
            Store::Supabase(s) => s.select(q).await,
        }
    }

    pub async fn insert(&self, table: Table, rows: Vec<Map<String, Value>>) -> Result<Vec<Value>, StoreError> {
        match self {
            Store::Sqlite(s) => s.insert(table, rows).await,
            Store::Supabase(s) => s.insert(table, rows).await,
        }
    }

    pub async fn upsert(&self, table: Table, rows: Vec<Map<String, Value>>) -> Result<usize, StoreError> {
        match self {
            Store::Sqlite(s) => s.upsert(table, rows).await,
            Store::Supabase(s) => s.upsert(table, rows).await,
        }
    }

    pub async fn update(
        &self,
        table: Table,
        changes: Map<String, Value>,
        filters: Vec<Filter>,
    ) -> Result<Vec<Value>, StoreError> {
        match self {
            Store::Sqlite(s) => s.update(table, changes, filters).await,
            Store::Supabase(s) => s.update(table, changes, filters).await,
        }
    }

    pub async fn increment_raised(&self, project_id: &str, amount: f64) -> Result<Option<f64>, StoreError> {
        match self {
            Store::Sqlite(s) => s.increment_raised(project_id, amount).await,
            Store::Supabase(s) => s.increment_raised(project_id, amount).await,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, q: &Query) -> Result<Vec<T>, StoreError> {
        self.select(q)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    async fn fetch_one<T: DeserializeOwned>(&self, q: Query) -> Result<Option<T>, StoreError> {
        Ok(self.fetch(&q.limit(1)).await?.into_iter().next())
    }
}

fn into_row(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn first_decoded<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>, StoreError> {
    rows.into_iter()
        .next()
        .map(serde_json::from_value)
        .transpose()
        .map_err(StoreError::from)
}

// Projects

pub async fn list_projects(db: &DbPool, status: Option<ProjectStatus>) -> Result<Vec<Project>, StoreError> {
    let mut q = Query::from(Table::Projects);
    if let Some(status) = status {
        q = q.eq("status", status.as_str())?;
    }
    db.fetch(&q.order("created_at", false)?).await
}

pub async fn get_project(db: &DbPool, id: &str) -> Result<Option<Project>, StoreError> {
    db.fetch_one(Query::from(Table::Projects).eq("id", id)?).await
}

pub async fn create_project(db: &DbPool, project: NewProject) -> Result<Project, StoreError> {
    let now = Utc::now().to_rfc3339();
    let row = json!({
        "id": project.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        "title": project.title,
        "description": project.description,
        "image_url": project.image_url,
        "target": project.target,
        "raised": project.raised,
        "start_date": project.start_date.to_rfc3339(),
        "end_date": project.end_date.map(|d| d.to_rfc3339()),
        "status": project.status.as_str(),
        "created_at": now,
        "updated_at": now,
    });
    let rows = db.insert(Table::Projects, vec![into_row(row)]).await?;
    first_decoded(rows)?.ok_or_else(|| StoreError::InvalidQuery("insert returned no project".into()))
}

/// Applies the provided fields and bumps `updated_at`. `Ok(None)` when no project matched.
pub async fn update_project(db: &DbPool, id: &str, update: ProjectUpdate) -> Result<Option<Project>, StoreError> {
    let mut changes = Map::new();
    if let Some(v) = update.title {
        changes.insert("title".into(), json!(v));
    }
    if let Some(v) = update.description {
        changes.insert("description".into(), json!(v));
    }
    if let Some(v) = update.image_url {
        changes.insert("image_url".into(), json!(v));
    }
    if let Some(v) = update.target {
        changes.insert("target".into(), json!(v));
    }
    if let Some(v) = update.start_date {
        changes.insert("start_date".into(), json!(v.to_rfc3339()));
    }
    if let Some(v) = update.end_date {
        changes.insert("end_date".into(), json!(v.map(|d| d.to_rfc3339())));
    }
    if let Some(v) = update.status {
        changes.insert("status".into(), json!(v.as_str()));
    }
    changes.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));

    let rows = db
        .update(Table::Projects, changes, vec![Filter::eq(Table::Projects, "id", id)?])
        .await?;
    first_decoded(rows)
}

pub async fn increment_project_raised(db: &DbPool, project_id: &str, amount: f64) -> Result<Option<f64>, StoreError> {
    db.increment_raised(project_id, amount).await
}

fn demo_projects() -> Vec<NewProject> {
    let now = Utc::now();
    let days = chrono::Duration::days;
    vec![
        NewProject {
            id: Some("clean-water-init-001".into()),
            title: "Clean Water Initiative".into(),
            description: "Providing clean drinking water to rural communities through well construction and filtration systems.".into(),
            image_url: "https://images.unsplash.com/photo-1516937941344-00b4e0337589?auto=format&fit=crop&w=1170&q=80".into(),
            target: 25000.0,
            raised: 8750.0,
            start_date: now,
            end_date: Some(now + days(90)),
            status: ProjectStatus::Active,
        },
        NewProject {
            id: Some("education-scholar-002".into()),
            title: "Educational Scholarships".into(),
            description: "Providing academic scholarships for talented students from disadvantaged backgrounds to pursue higher education.".into(),
            image_url: "https://images.unsplash.com/photo-1523240795612-9a054b0db644?auto=format&fit=crop&w=1170&q=80".into(),
            target: 15000.0,
            raised: 6200.0,
            start_date: now,
            end_date: Some(now + days(60)),
            status: ProjectStatus::Active,
        },
        NewProject {
            id: Some("healthcare-outreach-003".into()),
            title: "Healthcare Outreach".into(),
            description: "Mobile healthcare services bringing medical care to remote villages and providing essential medical supplies.".into(),
            image_url: "https://images.unsplash.com/photo-1584982751601-97dcc096659c?auto=format&fit=crop&w=1172&q=80".into(),
            target: 30000.0,
            raised: 12800.0,
            start_date: now,
            end_date: Some(now + days(120)),
            status: ProjectStatus::Active,
        },
    ]
}

/// Seeds the demo campaigns when the projects table is empty. Returns how many were inserted.
pub async fn ensure_demo_projects(db: &DbPool) -> Result<usize, StoreError> {
    let existing = db
        .select(&Query::from(Table::Projects).select("id")?.limit(1))
        .await?;
    if !existing.is_empty() {
        return Ok(0);
    }
    let demos = demo_projects();
    let count = demos.len();
    for project in demos {
        create_project(db, project).await?;
    }
    tracing::info!("Seeded {} demo projects", count);
    Ok(count)
}

// Donations

pub async fn add_donation(db: &DbPool, donation: NewDonation) -> Result<Donation, StoreError> {
    let row = json!({
        "id": Uuid::new_v4().to_string(),
        "name": donation.name,
        "email": donation.email,
        "amount": donation.amount,
        "message": donation.message,
        "project_id": donation.project_id,
        "project_name": donation.project_name,
        "transfer_confirmation": donation.transfer_confirmation,
        "status": DonationStatus::Pending.as_str(),
        "created_at": Utc::now().to_rfc3339(),
        "verified_at": Value::Null,
        "payment_reference": donation.payment_reference,
    });
    let rows = db.insert(Table::Donations, vec![into_row(row)]).await?;
    first_decoded(rows)?.ok_or_else(|| StoreError::InvalidQuery("insert returned no donation".into()))
}

pub async fn get_donation(db: &DbPool, id: &str) -> Result<Option<Donation>, StoreError> {
    db.fetch_one(Query::from(Table::Donations).eq("id", id)?).await
}

/// Newest first, each with `project_title` resolved from the projects table.
pub async fn list_donations(
    db: &DbPool,
    project_id: Option<&str>,
    status: Option<DonationStatus>,
) -> Result<Vec<Donation>, StoreError> {
    let mut q = Query::from(Table::Donations);
    if let Some(pid) = project_id {
        q = q.eq("project_id", pid)?;
    }
    if let Some(status) = status {
        q = q.eq("status", status.as_str())?;
    }
    let mut donations: Vec<Donation> = db.fetch(&q.order("created_at", false)?).await?;

    let titles: HashMap<String, String> = list_projects(db, None)
        .await?
        .into_iter()
        .map(|p| (p.id, p.title))
        .collect();
    for d in &mut donations {
        d.project_title = d.project_id.as_ref().and_then(|pid| titles.get(pid).cloned());
    }
    Ok(donations)
}

pub async fn set_donation_status(
    db: &DbPool,
    id: &str,
    status: DonationStatus,
) -> Result<Option<Donation>, StoreError> {
    let verified_at = match status {
        DonationStatus::Verified => json!(Utc::now().to_rfc3339()),
        _ => Value::Null,
    };
    let mut changes = Map::new();
    changes.insert("status".into(), json!(status.as_str()));
    changes.insert("verified_at".into(), verified_at);
    let rows = db
        .update(Table::Donations, changes, vec![Filter::eq(Table::Donations, "id", id)?])
        .await?;
    first_decoded(rows)
}

// Contact messages

pub async fn add_contact_message(db: &DbPool, message: NewContactMessage) -> Result<ContactMessage, StoreError> {
    let row = json!({
        "id": Uuid::new_v4().to_string(),
        "name": message.name,
        "email": message.email,
        "subject": message.subject,
        "message": message.message,
        "created_at": Utc::now().to_rfc3339(),
        "responded": false,
    });
    let rows = db.insert(Table::ContactMessages, vec![into_row(row)]).await?;
    first_decoded(rows)?.ok_or_else(|| StoreError::InvalidQuery("insert returned no message".into()))
}

pub async fn list_contact_messages(db: &DbPool) -> Result<Vec<ContactMessage>, StoreError> {
    db.fetch(&Query::from(Table::ContactMessages).order("created_at", false)?)
        .await
}

pub async fn mark_responded(db: &DbPool, id: &str) -> Result<bool, StoreError> {
    let mut changes = Map::new();
    changes.insert("responded".into(), json!(true));
    let rows = db
        .update(
            Table::ContactMessages,
            changes,
            vec![Filter::eq(Table::ContactMessages, "id", id)?],
        )
        .await?;
    Ok(!rows.is_empty())
}

pub async fn stats(db: &DbPool) -> Result<Stats, StoreError> {
    let projects = db
        .select(&Query::from(Table::Projects).select("id,status")?)
        .await?;
    let active_projects = projects
        .iter()
        .filter(|p| p.get("status").and_then(Value::as_str) == Some(ProjectStatus::Active.as_str()))
        .count();

    let verified = db
        .select(
            &Query::from(Table::Donations)
                .select("amount")?
                .eq("status", DonationStatus::Verified.as_str())?,
        )
        .await?;
    let total_raised = verified
        .iter()
        .filter_map(|d| d.get("amount").and_then(Value::as_f64))
        .sum();

    let messages = db
        .select(&Query::from(Table::ContactMessages).select("id")?)
        .await?;

    Ok(Stats {
        total_projects: projects.len(),
        active_projects,
        total_donations: verified.len(),
        total_raised,
        total_messages: messages.len(),
    })
}
