use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::{Map, Value};

use foundation_site::config::{Backend, Config};
use foundation_site::db::{self, query::{Query, Table}, DbPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Supabase,
    Sqlite,
}

/// Copies projects, donations and contact messages from one store to another.
#[derive(Debug, Parser)]
#[command(name = "foundation-migrate", version)]
struct Args {
    /// Store to read from.
    #[arg(long, value_enum, default_value = "supabase")]
    from: StoreKind,
    /// Store to write to.
    #[arg(long, value_enum, default_value = "sqlite")]
    to: StoreKind,
    /// SQLite database file used on the embedded side.
    #[arg(long, env = "SQLITE_PATH", default_value = "db/database.sqlite")]
    sqlite_path: String,
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    supabase_key: Option<String>,
}

impl Args {
    fn backend(&self, kind: StoreKind) -> anyhow::Result<Backend> {
        Ok(match kind {
            StoreKind::Sqlite => Backend::Sqlite { path: self.sqlite_path.clone() },
            StoreKind::Supabase => Backend::Supabase {
                url: self
                    .supabase_url
                    .clone()
                    .or_else(|| std::env::var("VITE_SUPABASE_URL").ok())
                    .context("Please set SUPABASE_URL (or VITE_SUPABASE_URL)")?,
                anon_key: self
                    .supabase_key
                    .clone()
                    .or_else(|| std::env::var("VITE_SUPABASE_ANON_KEY").ok())
                    .context("Please set SUPABASE_ANON_KEY (or VITE_SUPABASE_ANON_KEY)")?,
            },
        })
    }
}

async fn open(backend: Backend) -> anyhow::Result<DbPool> {
    let mut config = Config::for_sqlite(":memory:");
    config.backend = backend;
    db::init_pool(&config).await
}

/// Copies one table oldest-first; returns the number of rows written.
async fn migrate_table(source: &DbPool, target: &DbPool, table: Table) -> anyhow::Result<usize> {
    let rows = source
        .select(&Query::from(table).order("created_at", true)?)
        .await
        .with_context(|| format!("Error fetching {}", table.name()))?;

    if rows.is_empty() {
        return Ok(0);
    }

    let rows: Vec<Map<String, Value>> = rows
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    let count = rows.len();
    target
        .upsert(table, rows)
        .await
        .with_context(|| format!("Error writing {}", table.name()))?;
    Ok(count)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if it exists
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if args.from == args.to {
        anyhow::bail!("--from and --to must name different stores");
    }

    println!("Starting {:?} -> {:?} migration...", args.from, args.to);
    let source = open(args.backend(args.from)?).await?;
    let target = open(args.backend(args.to)?).await?;

    for table in Table::ALL {
        println!("Migrating {}...", table.name());
        match migrate_table(&source, &target, table).await? {
            0 => println!("No {} to migrate", table.name()),
            n => println!("Migrated {} {}", n, table.name()),
        }
    }

    println!("Migration completed successfully.");
    if args.to == StoreKind::Sqlite {
        println!("Set USE_SUPABASE=false in your .env to serve from {}", args.sqlite_path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation_site::db::models::{NewContactMessage, NewDonation};
    use foundation_site::db::sqlite::SqliteStore;
    use foundation_site::db::Store;

    #[tokio::test]
    async fn copies_every_table_between_sqlite_stores() {
        let source = Store::Sqlite(SqliteStore::open(":memory:").expect("source"));
        let target = Store::Sqlite(SqliteStore::open(":memory:").expect("target"));

        db::ensure_demo_projects(&source).await.expect("seed");
        db::add_donation(
            &source,
            NewDonation {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                amount: 40.0,
                message: None,
                project_id: Some("clean-water-init-001".into()),
                project_name: Some("Clean Water Initiative".into()),
                transfer_confirmation: "sent".into(),
                payment_reference: None,
            },
        )
        .await
        .expect("donation");
        db::add_contact_message(
            &source,
            NewContactMessage {
                name: "Bo".into(),
                email: "bo@example.com".into(),
                subject: None,
                message: "hi".into(),
            },
        )
        .await
        .expect("message");

        assert_eq!(migrate_table(&source, &target, Table::Projects).await.expect("projects"), 3);
        assert_eq!(migrate_table(&source, &target, Table::Donations).await.expect("donations"), 1);
        assert_eq!(migrate_table(&source, &target, Table::ContactMessages).await.expect("messages"), 1);

        // Running again updates rather than duplicates.
        migrate_table(&source, &target, Table::Projects).await.expect("again");
        assert_eq!(db::list_projects(&target, None).await.expect("list").len(), 3);
        let messages = db::list_contact_messages(&target).await.expect("messages");
        assert!(!messages[0].responded);
    }

    #[test]
    fn cli_defaults_to_supabase_into_sqlite() {
        let args = Args::try_parse_from(["foundation-migrate", "--sqlite-path", "x.sqlite"]).expect("args");
        assert_eq!(args.from, StoreKind::Supabase);
        assert_eq!(args.to, StoreKind::Sqlite);
        assert_eq!(
            args.backend(StoreKind::Sqlite).expect("backend"),
            Backend::Sqlite { path: "x.sqlite".into() }
        );
    }
}
