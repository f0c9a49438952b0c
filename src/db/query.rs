//! Backend-neutral query surface.
//!
//! A `Query` names a table, a column selection, equality filters, an optional
//! ordering and an optional limit. It renders either to parameterized SQL for
//! the embedded store or to PostgREST query pairs for the hosted store. Column
//! names are checked against a per-table allow-list before rendering, values are
//! always bound.

use serde_json::{Map, Value};

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Projects,
    Donations,
    ContactMessages,
}

const PROJECT_COLUMNS: &[&str] = &[
    "id",
    "title",
    "description",
    "image_url",
    "target",
    "raised",
    "start_date",
    "end_date",
    "status",
    "created_at",
    "updated_at",
];

const DONATION_COLUMNS: &[&str] = &[
    "id",
    "name",
    "email",
    "amount",
    "message",
    "project_id",
    "project_name",
    "transfer_confirmation",
    "status",
    "created_at",
    "verified_at",
    "payment_reference",
];

const CONTACT_MESSAGE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "email",
    "subject",
    "message",
    "created_at",
    "responded",
];

impl Table {
    /// Tables in foreign-key order: projects before the donations that reference them.
    pub const ALL: [Table; 3] = [Table::Projects, Table::Donations, Table::ContactMessages];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Projects => "projects",
            Table::Donations => "donations",
            Table::ContactMessages => "contact_messages",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Projects => PROJECT_COLUMNS,
            Table::Donations => DONATION_COLUMNS,
            Table::ContactMessages => CONTACT_MESSAGE_COLUMNS,
        }
    }

    /// Resolves a caller-supplied column name to the table's own static name.
    pub fn column(&self, name: &str) -> Result<&'static str, StoreError> {
        self.columns()
            .iter()
            .copied()
            .find(|c| *c == name)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.name(),
                column: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub value: Value,
}

impl Filter {
    pub fn eq(table: Table, column: &str, value: impl Into<Value>) -> Result<Self, StoreError> {
        Ok(Filter {
            column: table.column(column)?,
            value: value.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub struct Query {
    table: Table,
    columns: Option<Vec<&'static str>>,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Query {
            table,
            columns: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// Comma separated column list; `*` (or empty) selects every column.
    pub fn select(mut self, columns: &str) -> Result<Self, StoreError> {
        let trimmed = columns.trim();
        if trimmed.is_empty() || trimmed == "*" {
            self.columns = None;
            return Ok(self);
        }
        let mut resolved = Vec::new();
        for name in trimmed.split(',') {
            resolved.push(self.table.column(name.trim())?);
        }
        self.columns = Some(resolved);
        Ok(self)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Result<Self, StoreError> {
        self.filters.push(Filter::eq(self.table, column, value)?);
        Ok(self)
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Result<Self, StoreError> {
        self.order = Some(Order {
            column: self.table.column(column)?,
            ascending,
        });
        Ok(self)
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let columns = match &self.columns {
            Some(cols) => cols.join(", "),
            None => "*".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", columns, self.table.name());
        let mut params = Vec::new();

        let where_clause = render_where(&self.filters, &mut params);
        sql.push_str(&where_clause);

        if let Some(order) = self.order {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY {} {}", order.column, direction));
        }
        if let Some(limit) = self.limit {
            params.push(Value::from(limit as u64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }
        (sql, params)
    }

    pub fn to_postgrest(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let columns = match &self.columns {
            Some(cols) => cols.join(","),
            None => "*".to_string(),
        };
        pairs.push(("select".to_string(), columns));
        pairs.extend(postgrest_filters(&self.filters));
        if let Some(order) = self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

pub fn postgrest_filters(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| {
            let rendered = match &f.value {
                Value::Null => "is.null".to_string(),
                Value::String(s) => format!("eq.{}", s),
                other => format!("eq.{}", other),
            };
            (f.column.to_string(), rendered)
        })
        .collect()
}

fn render_where(filters: &[Filter], params: &mut Vec<Value>) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = filters
        .iter()
        .map(|f| {
            if f.value.is_null() {
                format!("{} IS NULL", f.column)
            } else {
                params.push(f.value.clone());
                format!("{} = ?{}", f.column, params.len())
            }
        })
        .collect();
    format!(" WHERE {}", clauses.join(" AND "))
}

/// Checks every key of `row` against the table's columns, keeping map order.
pub fn checked_columns(table: Table, row: &Map<String, Value>) -> Result<Vec<&'static str>, StoreError> {
    row.keys().map(|k| table.column(k)).collect()
}

/// With `upsert`, a row whose id already exists is updated in place. The row is
/// never deleted, so `ON DELETE` actions on referencing tables do not fire.
pub fn insert_sql(
    table: Table,
    row: &Map<String, Value>,
    upsert: bool,
) -> Result<(String, Vec<Value>), StoreError> {
    let columns = checked_columns(table, row)?;
    if columns.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "insert into {} without columns",
            table.name()
        )));
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        columns.join(", "),
        placeholders.join(", ")
    );
    if upsert {
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| **c != "id")
            .map(|c| format!("{} = excluded.{}", c, c))
            .collect();
        if updates.is_empty() {
            sql.push_str(" ON CONFLICT(id) DO NOTHING");
        } else {
            sql.push_str(&format!(" ON CONFLICT(id) DO UPDATE SET {}", updates.join(", ")));
        }
    }
    let params = columns.iter().map(|c| row[*c].clone()).collect();
    Ok((sql, params))
}

pub fn update_sql(
    table: Table,
    changes: &Map<String, Value>,
    filters: &[Filter],
) -> Result<(String, Vec<Value>), StoreError> {
    let columns = checked_columns(table, changes)?;
    if columns.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "update of {} without changes",
            table.name()
        )));
    }
    if filters.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "update of {} without a filter",
            table.name()
        )));
    }
    let mut params: Vec<Value> = Vec::new();
    let sets: Vec<String> = columns
        .iter()
        .map(|c| {
            params.push(changes[*c].clone());
            format!("{} = ?{}", c, params.len())
        })
        .collect();
    let where_clause = render_where(filters, &mut params);
    let sql = format!("UPDATE {} SET {}{}", table.name(), sets.join(", "), where_clause);
    Ok((sql, params))
}
