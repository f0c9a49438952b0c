use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Statement};
use serde_json::{Map, Value};
use std::path::Path;

use super::query::{self, Filter, Query, Table};
use super::StoreError;

pub type SqlitePool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = include_str!("../../migrations/sqlite/init.sql");

/// Embedded store: an r2d2 pool of rusqlite connections with the schema applied.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating when missing) the database at `path`. `:memory:` gives a
    /// private in-memory database held by a single pooled connection.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let manager = if in_memory {
            SqliteConnectionManager::memory()
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            SqliteConnectionManager::file(path)
        };
        let manager = manager.with_init(|c| {
            c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });

        let pool = Pool::builder()
            .max_size(if in_memory { 1 } else { 10 })
            .connection_timeout(std::time::Duration::from_secs(30))
            .build(manager)?;

        let conn = pool.get()?;
        if !in_memory {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!("sqlite journal_mode={}", mode);
        }
        conn.execute_batch(SCHEMA)?;
        drop(conn);

        tracing::info!("SQLite store ready at {}", path);
        Ok(SqliteStore { pool })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }

    pub async fn select(&self, q: &Query) -> Result<Vec<Value>, StoreError> {
        let (sql, params) = q.to_sql();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            rows_to_json(&mut stmt, &params)
        })
        .await
    }

    pub async fn insert(&self, table: Table, rows: Vec<Map<String, Value>>) -> Result<Vec<Value>, StoreError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                let (sql, params) = query::insert_sql(table, row, false)?;
                let mut stmt = tx.prepare(&format!("{} RETURNING *", sql))?;
                out.extend(rows_to_json(&mut stmt, &params)?);
            }
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    pub async fn upsert(&self, table: Table, rows: Vec<Map<String, Value>>) -> Result<usize, StoreError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut written = 0usize;
            for row in &rows {
                let (sql, params) = query::insert_sql(table, row, true)?;
                let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
                written += tx.execute(&sql, params_from_iter(bound))?;
            }
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    pub async fn update(
        &self,
        table: Table,
        changes: Map<String, Value>,
        filters: Vec<Filter>,
    ) -> Result<Vec<Value>, StoreError> {
        self.run(move |conn| {
            let (sql, params) = query::update_sql(table, &changes, &filters)?;
            let mut stmt = conn.prepare(&format!("{} RETURNING *", sql))?;
            rows_to_json(&mut stmt, &params)
        })
        .await
    }

    /// Adds `amount` to a project's running total in a single statement.
    pub async fn increment_raised(&self, project_id: &str, amount: f64) -> Result<Option<f64>, StoreError> {
        let project_id = project_id.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.run(move |conn| {
            let raised = conn
                .query_row(
                    "UPDATE projects SET raised = COALESCE(raised, 0) + ?1, updated_at = ?2 WHERE id = ?3 RETURNING raised",
                    rusqlite::params![amount, now, project_id],
                    |row| row.get::<_, f64>(0),
                )
                .optional()?;
            Ok(raised)
        })
        .await
    }
}

fn rows_to_json(stmt: &mut Statement<'_>, params: &[Value]) -> Result<Vec<Value>, StoreError> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
    let mut rows = stmt.query(params_from_iter(bound))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = Map::new();
        for (i, name) in names.iter().enumerate() {
            obj.insert(name.clone(), from_value_ref(row.get_ref(i)?));
        }
        out.push(Value::Object(obj));
    }
    Ok(out)
}

fn to_sql_value(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_value_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}
