//! SQLite-backed lead store.
//!
//! # Responsibility
//! - Persist leads and their tags in `leads` / `lead_tags`.
//! - Push stage, priority and tag filters down into SQL.
//!
//! # Invariants
//! - Writes validate the lead before any SQL mutation.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Blocking SQLite work never runs on the async executor threads.

use crate::db::{open_db, open_db_in_memory};
use crate::model::filter::LeadFilter;
use crate::model::lead::{Lead, LeadAttributes, LeadId, Priority, Stage};
use crate::repo::lead_store::{LeadStore, StoreError, StoreOp, StoreResult};
use async_trait::async_trait;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

const LEAD_SELECT_SQL: &str = "SELECT
    uuid,
    stage,
    name,
    company,
    email,
    amount_cents,
    priority
FROM leads";

/// Lead store over one shared SQLite connection.
#[derive(Clone)]
pub struct SqliteLeadStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLeadStore {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Inserts one lead with its tags in a single transaction.
    ///
    /// Blocking; intended for seeding and import paths.
    pub fn insert(&self, lead: &Lead) -> StoreResult<LeadId> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        insert_lead(&mut conn, lead)
    }

    /// Loads one lead by id. Blocking.
    pub fn get(&self, id: LeadId) -> StoreResult<Option<Lead>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        get_lead(&conn, id)
    }

    async fn run<T, F>(&self, op: StoreOp, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Transient(format!("{} task failed: {err}", op.as_str())))?
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn list(&self, filter: &LeadFilter) -> StoreResult<Vec<Lead>> {
        let filter = filter.clone();
        let leads = self
            .run(StoreOp::List, move |conn| list_leads(conn, &filter))
            .await?;
        debug!(
            "event=store_list module=store status=ok backend=sqlite leads={}",
            leads.len()
        );
        Ok(leads)
    }

    async fn update_stage(&self, id: LeadId, stage: Stage) -> StoreResult<Lead> {
        self.run(StoreOp::UpdateStage, move |conn| {
            update_lead_stage(conn, id, stage)
        })
        .await
    }
}

fn insert_lead(conn: &mut Connection, lead: &Lead) -> StoreResult<LeadId> {
    let mut attributes = lead.attributes.clone();
    attributes.normalize_tags();
    let lead = Lead {
        attributes,
        ..lead.clone()
    };
    lead.validate()?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO leads (
            uuid,
            stage,
            name,
            company,
            email,
            amount_cents,
            priority
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            lead.id.to_string(),
            lead.stage.as_str(),
            lead.attributes.name.as_str(),
            lead.attributes.company.as_deref(),
            lead.attributes.email.as_deref(),
            lead.attributes.amount_cents,
            lead.attributes.priority.as_str(),
        ],
    )?;
    for tag in &lead.attributes.tags {
        tx.execute(
            "INSERT OR IGNORE INTO lead_tags (lead_uuid, tag) VALUES (?1, ?2);",
            params![lead.id.to_string(), tag.as_str()],
        )?;
    }
    tx.commit()?;

    Ok(lead.id)
}

fn get_lead(conn: &Connection, id: LeadId) -> StoreResult<Option<Lead>> {
    let mut stmt = conn.prepare(&format!("{LEAD_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => {
            let mut lead = parse_lead_row(row)?;
            lead.attributes.tags = load_tags(conn, lead.id)?;
            Ok(Some(lead))
        }
        None => Ok(None),
    }
}

fn list_leads(conn: &Connection, filter: &LeadFilter) -> StoreResult<Vec<Lead>> {
    let mut sql = format!("{LEAD_SELECT_SQL} WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    if !filter.stages.is_empty() {
        sql.push_str(&format!(
            " AND stage IN ({})",
            placeholders(filter.stages.len())
        ));
        bind_values.extend(
            filter
                .stages
                .iter()
                .map(|stage| Value::Text(stage.as_str().to_string())),
        );
    }

    if !filter.priorities.is_empty() {
        sql.push_str(&format!(
            " AND priority IN ({})",
            placeholders(filter.priorities.len())
        ));
        bind_values.extend(
            filter
                .priorities
                .iter()
                .map(|priority| Value::Text(priority.as_str().to_string())),
        );
    }

    let tags = filter.normalized_tags();
    if !tags.is_empty() {
        sql.push_str(&format!(
            " AND uuid IN (SELECT lead_uuid FROM lead_tags WHERE tag IN ({}))",
            placeholders(tags.len())
        ));
        bind_values.extend(tags.into_iter().map(Value::Text));
    }

    sql.push_str(" ORDER BY rowid ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut leads = Vec::new();
    while let Some(row) = rows.next()? {
        leads.push(parse_lead_row(row)?);
    }

    for lead in &mut leads {
        lead.attributes.tags = load_tags(conn, lead.id)?;
    }
    leads.retain(|lead| filter.matches_search(lead));

    Ok(leads)
}

fn update_lead_stage(conn: &Connection, id: LeadId, stage: Stage) -> StoreResult<Lead> {
    let changed = conn.execute(
        "UPDATE leads
         SET
            stage = ?1,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?2;",
        params![stage.as_str(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }

    get_lead(conn, id)?.ok_or(StoreError::NotFound(id))
}

fn load_tags(conn: &Connection, id: LeadId) -> StoreResult<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT tag FROM lead_tags WHERE lead_uuid = ?1 ORDER BY tag ASC;")?;
    let tags = stmt
        .query_map([id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn parse_lead_row(row: &Row<'_>) -> StoreResult<Lead> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{uuid_text}` in leads.uuid"))
    })?;

    let stage_text: String = row.get("stage")?;
    let stage = Stage::parse(&stage_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid stage `{stage_text}` in leads.stage"))
    })?;

    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid priority `{priority_text}` in leads.priority"
        ))
    })?;

    let attributes = LeadAttributes {
        name: row.get("name")?,
        company: row.get("company")?,
        email: row.get("email")?,
        amount_cents: row.get("amount_cents")?,
        tags: Vec::new(),
        priority,
    };
    let lead = Lead {
        id,
        stage,
        attributes,
    };
    lead.validate()?;
    Ok(lead)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
