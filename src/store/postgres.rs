// src/store/postgres.rs

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config, NoTls};

use super::{
    ensure_columns, ensure_queryable, PendingFilter, RecordStore, Table, UpsertOutcome,
};
use crate::models::ReviewStatus;

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Tables and indexes this engine relies on. Entity tables are usually
/// owned by the surrounding application; the statements are all
/// IF NOT EXISTS so bootstrapping an empty database and attaching to an
/// existing one go through the same path.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    linkedin TEXT,
    category TEXT,
    created_at TIMESTAMPTZ DEFAULT now()
);

CREATE TABLE IF NOT EXISTS contact_emails (
    contact_id TEXT NOT NULL,
    email TEXT NOT NULL,
    is_primary BOOLEAN NOT NULL DEFAULT false
);
CREATE INDEX IF NOT EXISTS idx_contact_emails_email ON contact_emails (email);

CREATE TABLE IF NOT EXISTS contact_mobiles (
    contact_id TEXT NOT NULL,
    mobile TEXT NOT NULL,
    is_primary BOOLEAN NOT NULL DEFAULT false
);
CREATE INDEX IF NOT EXISTS idx_contact_mobiles_mobile ON contact_mobiles (mobile);

CREATE TABLE IF NOT EXISTS companies (
    id TEXT PRIMARY KEY,
    name TEXT,
    linkedin TEXT,
    website TEXT,
    category TEXT,
    created_at TIMESTAMPTZ DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_companies_name ON companies (name);

CREATE TABLE IF NOT EXISTS company_domains (
    company_id TEXT NOT NULL,
    domain TEXT NOT NULL,
    is_primary BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_company_domains_domain ON company_domains (domain);

CREATE TABLE IF NOT EXISTS duplicate_pairs (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    duplicate_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    match_type TEXT NOT NULL,
    match_details JSONB,
    status TEXT NOT NULL DEFAULT 'pending',
    false_positive BOOLEAN NOT NULL DEFAULT false,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    resolved_at TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_duplicate_pairs_pending
    ON duplicate_pairs (source_id, duplicate_id, entity_type) WHERE status = 'pending';
CREATE INDEX IF NOT EXISTS idx_duplicate_pairs_source ON duplicate_pairs (source_id);
CREATE INDEX IF NOT EXISTS idx_duplicate_pairs_duplicate ON duplicate_pairs (duplicate_id);

CREATE TABLE IF NOT EXISTS integrity_issues (
    id TEXT PRIMARY KEY,
    issue_type TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT,
    name TEXT,
    email TEXT,
    mobile TEXT,
    domain TEXT,
    details JSONB,
    natural_key TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    resolved_at TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_integrity_issues_pending
    ON integrity_issues (natural_key) WHERE status = 'pending';
CREATE INDEX IF NOT EXISTS idx_integrity_issues_domain ON integrity_issues (domain);

CREATE TABLE IF NOT EXISTS merge_intents (
    id TEXT PRIMARY KEY,
    primary_id TEXT NOT NULL,
    duplicate_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    merge_selections JSONB NOT NULL,
    triggered BOOLEAN NOT NULL DEFAULT false,
    status TEXT NOT NULL DEFAULT 'pending',
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_merge_intents_pair
    ON merge_intents (primary_id, duplicate_id, entity_type);
";

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "crm".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("crm_dedupe");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(20)
        .min_idle(Some(2))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    // Test connection
    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    info!("Database connection pool initialized successfully.");
    Ok(pool.clone())
}

/// Postgres-backed [`RecordStore`]
///
/// Row I/O is generic: records enter through `jsonb_populate_record` and
/// leave through `row_to_json`, so the trait's JSON-object row contract
/// holds without per-table marshalling code.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds a store over a pool configured from the environment
    pub async fn connect() -> Result<Self> {
        Ok(Self::new(connect().await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the engine's tables and unique indexes if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for ensure_schema")?;
        conn.batch_execute(SCHEMA_SQL)
            .await
            .context("Failed to apply engine schema")?;
        info!("Engine schema is in place");
        Ok(())
    }
}

fn upsert_sql(table: Table, conflict_key: &[&str]) -> String {
    let name = table.name();
    if conflict_key.is_empty() {
        return format!(
            "INSERT INTO {} AS t SELECT * FROM jsonb_populate_record(NULL::{}, $1) \
             RETURNING row_to_json(t) AS row, true AS was_inserted",
            name, name
        );
    }
    let scope = if table.pending_scoped_conflicts() {
        " WHERE status = 'pending'"
    } else {
        ""
    };
    // The DO UPDATE writes a column back to itself so that RETURNING can
    // hand back the existing row; (xmax = 0) distinguishes a fresh insert.
    let touch = conflict_key[0];
    format!(
        "INSERT INTO {} AS t SELECT * FROM jsonb_populate_record(NULL::{}, $1) \
         ON CONFLICT ({}){} DO UPDATE SET {} = t.{} \
         RETURNING row_to_json(t) AS row, (xmax = 0) AS was_inserted",
        name,
        name,
        conflict_key.join(", "),
        scope,
        touch,
        touch
    )
}

/// SQL for `patch_row`: the jsonb patch goes through the table's row type
/// so every named column receives a properly typed value
fn patch_sql(table: Table, columns: &[String]) -> String {
    let name = table.name();
    let sources: Vec<String> = columns.iter().map(|c| format!("p.{}", c)).collect();
    format!(
        "UPDATE {} AS t SET ({}) = (SELECT {} FROM jsonb_populate_record(NULL::{}, $2) p) \
         WHERE t.id = $1 RETURNING row_to_json(t) AS row",
        name,
        columns.join(", "),
        sources.join(", "),
        name
    )
}

/// WHERE clauses and parameters for `list_pending`
fn pending_where(filter: &PendingFilter) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
    let mut clauses: Vec<String> = vec!["status = 'pending'".to_string()];
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();

    if let Some(entity_type) = filter.entity_type {
        params.push(Box::new(entity_type.as_str().to_string()));
        clauses.push(format!("entity_type = ${}", params.len()));
    }
    if let Some(issue_type) = filter.issue_type {
        params.push(Box::new(issue_type.as_str().to_string()));
        clauses.push(format!("issue_type = ${}", params.len()));
    }
    if let Some(domain) = &filter.domain {
        params.push(Box::new(domain.clone()));
        clauses.push(format!("LOWER(domain) = LOWER(${})", params.len()));
    }
    if let Some(entity_id) = &filter.entity_id {
        params.push(Box::new(entity_id.0.clone()));
        clauses.push(format!("entity_id = ${}", params.len()));
    }
    if let Some(involving) = &filter.involving {
        params.push(Box::new(involving.0.clone()));
        let idx = params.len();
        clauses.push(format!("(source_id = ${} OR duplicate_id = ${})", idx, idx));
    }

    (clauses.join(" AND "), params)
}

#[async_trait]
impl RecordStore for PgStore {
    async fn find_by_exact_field(
        &self,
        table: Table,
        field: &str,
        values: &[String],
    ) -> Result<Vec<Value>> {
        ensure_queryable(table, field)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for find_by_exact_field")?;
        let sql = format!(
            "SELECT row_to_json(t) AS row FROM {} t WHERE t.{} = ANY($1)",
            table.name(),
            field
        );
        let rows = conn
            .query(&sql, &[&values])
            .await
            .with_context(|| format!("Failed exact-field query on {}.{}", table.name(), field))?;
        Ok(rows.into_iter().map(|r| r.get("row")).collect())
    }

    async fn find_by_pattern(
        &self,
        table: Table,
        field: &str,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<Value>> {
        ensure_queryable(table, field)?;
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for find_by_pattern")?;
        let sql = format!(
            "SELECT row_to_json(t) AS row FROM {} t WHERE t.{} ILIKE $1 LIMIT $2",
            table.name(),
            field
        );
        let rows = conn
            .query(&sql, &[&pattern, &limit])
            .await
            .with_context(|| format!("Failed pattern query on {}.{}", table.name(), field))?;
        debug!(
            "Pattern query {}.{} '{}' returned {} rows",
            table.name(),
            field,
            pattern,
            rows.len()
        );
        Ok(rows.into_iter().map(|r| r.get("row")).collect())
    }

    async fn upsert(
        &self,
        table: Table,
        record: Value,
        conflict_key: &[&str],
    ) -> Result<UpsertOutcome> {
        ensure_columns(table, conflict_key)?;
        if !record.is_object() {
            bail!("Store rows must be JSON objects");
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for upsert")?;
        let sql = upsert_sql(table, conflict_key);
        let row = conn
            .query_one(&sql, &[&record])
            .await
            .with_context(|| format!("Failed to upsert into {}", table.name()))?;
        Ok(UpsertOutcome {
            row: row.get("row"),
            inserted: row.get("was_inserted"),
        })
    }

    async fn insert(&self, table: Table, record: Value) -> Result<Value> {
        if !record.is_object() {
            bail!("Store rows must be JSON objects");
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for insert")?;
        let sql = format!(
            "INSERT INTO {} AS t SELECT * FROM jsonb_populate_record(NULL::{}, $1) \
             RETURNING row_to_json(t) AS row",
            table.name(),
            table.name()
        );
        let row = conn
            .query_one(&sql, &[&record])
            .await
            .with_context(|| format!("Failed to insert into {}", table.name()))?;
        Ok(row.get("row"))
    }

    async fn update_status(
        &self,
        table: Table,
        id: &str,
        status: ReviewStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<Value> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for update_status")?;
        let status_str = status.as_str();
        let row = if status.is_terminal() {
            let sql = format!(
                "UPDATE {} AS t SET status = $2, resolved_at = $3 WHERE id = $1 \
                 RETURNING row_to_json(t) AS row",
                table.name()
            );
            conn.query_opt(&sql, &[&id, &status_str, &timestamp]).await
        } else {
            let sql = format!(
                "UPDATE {} AS t SET status = $2 WHERE id = $1 \
                 RETURNING row_to_json(t) AS row",
                table.name()
            );
            conn.query_opt(&sql, &[&id, &status_str]).await
        }
        .with_context(|| format!("Failed to update status in {}", table.name()))?;

        match row {
            Some(row) => Ok(row.get("row")),
            None => bail!("No row with id '{}' in table '{}'", id, table.name()),
        }
    }

    async fn patch_row(&self, table: Table, id: &str, patch: Value) -> Result<Value> {
        let columns: Vec<String> = match patch.as_object() {
            Some(map) => map.keys().cloned().collect(),
            None => bail!("Patch must be a JSON object"),
        };
        if columns.is_empty() {
            bail!("Patch must name at least one column");
        }
        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        ensure_columns(table, &column_refs)?;

        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for patch_row")?;
        let sql = patch_sql(table, &columns);
        let row = conn
            .query_opt(&sql, &[&id, &patch])
            .await
            .with_context(|| format!("Failed to patch row in {}", table.name()))?;
        match row {
            Some(row) => Ok(row.get("row")),
            None => bail!("No row with id '{}' in table '{}'", id, table.name()),
        }
    }

    async fn list_pending(&self, table: Table, filter: &PendingFilter) -> Result<Vec<Value>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for list_pending")?;
        let (where_sql, params) = pending_where(filter);
        let sql = format!(
            "SELECT row_to_json(t) AS row FROM {} t WHERE {}",
            table.name(),
            where_sql
        );
        let params_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = conn
            .query(&sql, &params_refs)
            .await
            .with_context(|| format!("Failed to list pending rows in {}", table.name()))?;
        debug!("{} pending rows from {}", rows.len(), table.name());
        Ok(rows.into_iter().map(|r| r.get("row")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityType, IssueType};

    #[test]
    fn test_upsert_sql_pending_scope() {
        let sql = upsert_sql(
            Table::DuplicatePairs,
            &["source_id", "duplicate_id", "entity_type"],
        );
        assert!(sql.contains(
            "ON CONFLICT (source_id, duplicate_id, entity_type) WHERE status = 'pending'"
        ));
        assert!(sql.contains("(xmax = 0) AS was_inserted"));
    }

    #[test]
    fn test_upsert_sql_whole_table_scope() {
        let sql = upsert_sql(
            Table::MergeIntents,
            &["primary_id", "duplicate_id", "entity_type"],
        );
        assert!(sql.contains("ON CONFLICT (primary_id, duplicate_id, entity_type) DO UPDATE"));
        assert!(!sql.contains("WHERE status = 'pending'"));
    }

    #[test]
    fn test_upsert_sql_without_conflict_key() {
        let sql = upsert_sql(Table::Contacts, &[]);
        assert!(!sql.contains("ON CONFLICT"));
        assert!(sql.contains("true AS was_inserted"));
    }

    #[test]
    fn test_patch_sql_routes_columns_through_row_type() {
        let sql = patch_sql(
            Table::DuplicatePairs,
            &["false_positive".to_string(), "notes".to_string(), "status".to_string()],
        );
        assert_eq!(
            sql,
            "UPDATE duplicate_pairs AS t \
             SET (false_positive, notes, status) = \
             (SELECT p.false_positive, p.notes, p.status \
             FROM jsonb_populate_record(NULL::duplicate_pairs, $2) p) \
             WHERE t.id = $1 RETURNING row_to_json(t) AS row"
        );
    }

    #[test]
    fn test_pending_where_composition() {
        let filter = PendingFilter {
            issue_type: Some(IssueType::PotentialCompanyMatch),
            domain: Some("foo.com".to_string()),
            ..Default::default()
        };
        let (where_sql, params) = pending_where(&filter);
        assert_eq!(
            where_sql,
            "status = 'pending' AND issue_type = $1 AND LOWER(domain) = LOWER($2)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_pending_where_involving_reuses_parameter() {
        let filter = PendingFilter {
            entity_type: Some(EntityType::Company),
            involving: Some(EntityId("c-9".to_string())),
            ..Default::default()
        };
        let (where_sql, params) = pending_where(&filter);
        assert_eq!(
            where_sql,
            "status = 'pending' AND entity_type = $1 AND (source_id = $2 OR duplicate_id = $2)"
        );
        assert_eq!(params.len(), 2);
    }
}
