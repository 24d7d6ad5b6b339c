//! Lead and sequence tables.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::types::{Lead, LeadStage, Step};
use leadclaw_core::phone;

/// SQLite-backed document store.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

fn persist_err(e: impl std::fmt::Display) -> LeadClawError {
    LeadClawError::Persistence(e.to_string())
}

pub(crate) fn stage_str(stage: LeadStage) -> &'static str {
    match stage {
        LeadStage::New => "new",
        LeadStage::FormSubmitted => "form_submitted",
        LeadStage::WebLinkSent => "web_link_sent",
        LeadStage::LinkOpened => "link_opened",
    }
}

fn parse_stage(s: &str) -> LeadStage {
    match s {
        "form_submitted" => LeadStage::FormSubmitted,
        "web_link_sent" => LeadStage::WebLinkSent,
        "link_opened" => LeadStage::LinkOpened,
        _ => LeadStage::New,
    }
}

fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    })
}

/// Partial lead update, applied with merge semantics.
/// `None` fields are left untouched; `add_tags` unions into the tag set.
#[derive(Debug, Clone, Default)]
pub struct LeadPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub stage: Option<LeadStage>,
    pub add_tags: Vec<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub web_link_sent_at: Option<DateTime<Utc>>,
    pub link_opened_at: Option<DateTime<Utc>>,
    pub form_data: Option<serde_json::Value>,
}

impl Store {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(persist_err)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(persist_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                phone TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                slug TEXT NOT NULL DEFAULT '',
                stage TEXT NOT NULL DEFAULT 'new',
                tags TEXT NOT NULL DEFAULT '[]',
                form_data TEXT,
                created_at TEXT NOT NULL,
                last_message_at TEXT,
                web_link_sent_at TEXT,
                link_opened_at TEXT,
                unread_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_leads_slug ON leads(slug);

            CREATE TABLE IF NOT EXISTS sequences (
                name TEXT PRIMARY KEY,
                steps TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scheduled_steps (
                run_id TEXT NOT NULL,
                phone TEXT NOT NULL,
                sequence TEXT NOT NULL,
                step_index INTEGER NOT NULL,
                step TEXT NOT NULL,
                fire_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (run_id, step_index)
            );
            CREATE INDEX IF NOT EXISTS idx_sched_phone_seq
                ON scheduled_steps(phone, sequence, status);",
        )
        .map_err(persist_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new lead. Fails with `Conflict` if the phone is already known.
    pub fn create_lead(&self, raw_phone: &str, name: &str) -> Result<Lead> {
        let e164 = phone::to_e164(raw_phone)?;
        let id = phone::lead_id(raw_phone)?;
        let conn = self.conn.lock().map_err(persist_err)?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM leads WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(persist_err)?;
        if exists.is_some() {
            return Err(LeadClawError::Conflict(format!(
                "lead already exists: {e164}"
            )));
        }
        let now = Utc::now();
        conn.execute(
            "INSERT INTO leads (id, phone, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, e164, name, now.to_rfc3339()],
        )
        .map_err(persist_err)?;
        drop(conn);
        self.get_lead(&id)?
            .ok_or_else(|| LeadClawError::Persistence("lead vanished after insert".into()))
    }

    /// Fetch a lead by canonical id.
    pub fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        let conn = self.conn.lock().map_err(persist_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, phone, name, slug, stage, tags, created_at,
                        last_message_at, web_link_sent_at, link_opened_at, unread_count
                 FROM leads WHERE id = ?1",
            )
            .map_err(persist_err)?;
        let lead = stmt
            .query_row(rusqlite::params![id], |row| {
                Ok(Lead {
                    id: row.get(0)?,
                    phone: row.get(1)?,
                    name: row.get(2)?,
                    slug: row.get(3)?,
                    stage: parse_stage(&row.get::<_, String>(4)?),
                    tags: serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
                    created_at: parse_ts(Some(row.get(6)?)).unwrap_or_else(Utc::now),
                    last_message_at: parse_ts(row.get(7)?),
                    web_link_sent_at: parse_ts(row.get(8)?),
                    link_opened_at: parse_ts(row.get(9)?),
                    unread_count: row.get::<_, i64>(10)? as u32,
                })
            })
            .optional()
            .map_err(persist_err)?;
        Ok(lead)
    }

    /// Fetch a lead by phone in any accepted format.
    pub fn get_lead_by_phone(&self, raw_phone: &str) -> Result<Option<Lead>> {
        self.get_lead(&phone::lead_id(raw_phone)?)
    }

    /// Fetch a lead through its public site slug.
    pub fn get_lead_by_slug(&self, slug: &str) -> Result<Option<Lead>> {
        let conn = self.conn.lock().map_err(persist_err)?;
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM leads WHERE slug = ?1 LIMIT 1",
                rusqlite::params![slug],
                |row| row.get(0),
            )
            .optional()
            .map_err(persist_err)?;
        drop(conn);
        match id {
            Some(id) => self.get_lead(&id),
            None => Ok(None),
        }
    }

    /// Upsert a lead with merge semantics. Creates the record if missing;
    /// otherwise untouched fields keep their value and `add_tags` is unioned
    /// into the existing tag set.
    pub fn upsert_lead(&self, id: &str, patch: LeadPatch) -> Result<Lead> {
        let id = phone::lead_id(id)?;
        let existing = self.get_lead(&id)?;
        let conn = self.conn.lock().map_err(persist_err)?;

        let mut lead = match existing {
            Some(l) => l,
            None => {
                let now = Utc::now();
                conn.execute(
                    "INSERT INTO leads (id, phone, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, format!("+{id}"), now.to_rfc3339()],
                )
                .map_err(persist_err)?;
                Lead {
                    id: id.clone(),
                    phone: format!("+{id}"),
                    name: String::new(),
                    slug: String::new(),
                    stage: LeadStage::New,
                    tags: Vec::new(),
                    created_at: now,
                    last_message_at: None,
                    web_link_sent_at: None,
                    link_opened_at: None,
                    unread_count: 0,
                }
            }
        };

        if let Some(name) = patch.name {
            lead.name = name;
        }
        if let Some(slug) = patch.slug {
            lead.slug = slug;
        }
        if let Some(stage) = patch.stage {
            lead.stage = stage;
        }
        for tag in patch.add_tags {
            if !lead.has_tag(&tag) {
                lead.tags.push(tag);
            }
        }
        if patch.last_message_at.is_some() {
            lead.last_message_at = patch.last_message_at;
        }
        if patch.web_link_sent_at.is_some() {
            lead.web_link_sent_at = patch.web_link_sent_at;
        }
        if patch.link_opened_at.is_some() {
            lead.link_opened_at = patch.link_opened_at;
        }

        conn.execute(
            "UPDATE leads SET name = ?2, slug = ?3, stage = ?4, tags = ?5,
                    last_message_at = ?6, web_link_sent_at = ?7, link_opened_at = ?8
             WHERE id = ?1",
            rusqlite::params![
                lead.id,
                lead.name,
                lead.slug,
                stage_str(lead.stage),
                serde_json::to_string(&lead.tags).unwrap_or_else(|_| "[]".into()),
                lead.last_message_at.map(|t| t.to_rfc3339()),
                lead.web_link_sent_at.map(|t| t.to_rfc3339()),
                lead.link_opened_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(persist_err)?;

        if let Some(form) = patch.form_data {
            conn.execute(
                "UPDATE leads SET form_data = ?2 WHERE id = ?1",
                rusqlite::params![lead.id, form.to_string()],
            )
            .map_err(persist_err)?;
        }

        Ok(lead)
    }

    /// Store (or replace) a named sequence definition.
    pub fn put_sequence(&self, name: &str, steps: &[Step]) -> Result<()> {
        let conn = self.conn.lock().map_err(persist_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO sequences (name, steps, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                name,
                serde_json::to_string(steps).map_err(persist_err)?,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(persist_err)?;
        Ok(())
    }

    /// Fetch a sequence definition by name.
    pub fn get_sequence(&self, name: &str) -> Result<Option<Vec<Step>>> {
        let conn = self.conn.lock().map_err(persist_err)?;
        let steps: Option<String> = conn
            .query_row(
                "SELECT steps FROM sequences WHERE name = ?1",
                rusqlite::params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(persist_err)?;
        match steps {
            Some(json) => Ok(Some(serde_json::from_str(&json).map_err(persist_err)?)),
            None => Ok(None),
        }
    }

    /// List sequence names with their step counts.
    pub fn list_sequences(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.conn.lock().map_err(persist_err)?;
        let mut stmt = conn
            .prepare("SELECT name, steps FROM sequences ORDER BY name")
            .map_err(persist_err)?;
        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let steps: String = row.get(1)?;
                Ok((name, steps))
            })
            .map_err(persist_err)?;
        Ok(rows
            .filter_map(|r| r.ok())
            .map(|(name, json)| {
                let count = serde_json::from_str::<Vec<Step>>(&json)
                    .map(|s| s.len())
                    .unwrap_or(0);
                (name, count)
            })
            .collect())
    }
}
