//! SQLite storage implementation
//!
//! Single-connection store behind a mutex; every operation is a short
//! synchronous call, and review closure runs as one transaction so the
//! status transition and any entity creation persist together or not at all.

use crate::error::{MailroomError, Result};
use crate::storage::{ReviewOutcome, Store};
use crate::types::{
    BlockRole, Candidate, DocumentParse, EntityKind, FieldMap, Location, LocationId, NewEntity,
    ParseId, Person, PersonId, QueryKind, ReviewId, ReviewQueueItem, ReviewStats, ReviewStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS persons (
    id          TEXT PRIMARY KEY,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    dob         TEXT,
    legal_flags TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_persons_name
    ON persons (first_name COLLATE NOCASE, last_name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS locations (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    address    TEXT,
    city       TEXT,
    state      TEXT,
    zip        TEXT,
    country    TEXT,
    phone      TEXT,
    email      TEXT,
    website    TEXT,
    latitude   REAL,
    longitude  REAL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_locations_address ON locations (address, zip);
CREATE INDEX IF NOT EXISTS idx_locations_name ON locations (name, city, state);

CREATE TABLE IF NOT EXISTS document_parses (
    id                  TEXT PRIMARY KEY,
    doc_type            TEXT,
    source_file         TEXT,
    raw_text            TEXT NOT NULL,
    sender_text         TEXT,
    recipient_text      TEXT,
    body_text           TEXT NOT NULL,
    parsed_sender       TEXT NOT NULL,
    parsed_recipient    TEXT NOT NULL,
    sender_location_id  TEXT REFERENCES locations(id),
    recipient_person_id TEXT REFERENCES persons(id),
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS review_queue (
    id                 TEXT PRIMARY KEY,
    parse_id           TEXT NOT NULL REFERENCES document_parses(id),
    entity_kind        TEXT NOT NULL,
    query_kind         TEXT NOT NULL,
    fields             TEXT NOT NULL,
    candidates         TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'pending',
    resolved_entity_id TEXT,
    reviewed_by        TEXT,
    reviewed_at        TEXT,
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_status ON review_queue (status);
CREATE INDEX IF NOT EXISTS idx_review_slot ON review_queue (parse_id, entity_kind, status);
"#;

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening SQLite database: {}", path.as_ref().display());
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MailroomError::Other(format!("Connection lock poisoned: {}", e)))
    }

    fn insert_person_tx(conn: &Connection, person: &Person) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO persons (id, first_name, last_name, dob, legal_flags, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                person.id.to_string(),
                person.first_name,
                person.last_name,
                person.dob.map(|d| d.to_string()),
                person
                    .legal_flags
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                person.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_location_tx(conn: &Connection, location: &Location) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO locations (
                id, name, address, city, state, zip, country,
                phone, email, website, latitude, longitude, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                location.id.to_string(),
                location.name,
                location.address,
                location.city,
                location.state,
                location.zip,
                location.country,
                location.phone,
                location.email,
                location.website,
                location.geo.map(|g| g.0),
                location.geo.map(|g| g.1),
                location.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn conv_err<E>(e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn bad_column(what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("invalid {}: {}", what, value).into(),
    )
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn row_to_person(row: &Row<'_>) -> rusqlite::Result<Person> {
    let id: String = row.get("id")?;
    let dob: Option<String> = row.get("dob")?;
    let legal_flags: Option<String> = row.get("legal_flags")?;
    let created_at: String = row.get("created_at")?;

    Ok(Person {
        id: PersonId::from_string(&id).map_err(conv_err)?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        dob: dob
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(conv_err))
            .transpose()?,
        legal_flags: legal_flags
            .map(|s| serde_json::from_str(&s).map_err(conv_err))
            .transpose()?,
        created_at: parse_ts(&created_at).map_err(conv_err)?,
    })
}

fn row_to_location(row: &Row<'_>) -> rusqlite::Result<Location> {
    let id: String = row.get("id")?;
    let created_at: String = row.get("created_at")?;
    let latitude: Option<f64> = row.get("latitude")?;
    let longitude: Option<f64> = row.get("longitude")?;

    Ok(Location {
        id: LocationId::from_string(&id).map_err(conv_err)?,
        name: row.get("name")?,
        address: row.get("address")?,
        city: row.get("city")?,
        state: row.get("state")?,
        zip: row.get("zip")?,
        country: row.get("country")?,
        phone: row.get("phone")?,
        email: row.get("email")?,
        website: row.get("website")?,
        geo: latitude.zip(longitude),
        created_at: parse_ts(&created_at).map_err(conv_err)?,
    })
}

fn row_to_parse(row: &Row<'_>) -> rusqlite::Result<DocumentParse> {
    let id: String = row.get("id")?;
    let parsed_sender: String = row.get("parsed_sender")?;
    let parsed_recipient: String = row.get("parsed_recipient")?;
    let sender_location_id: Option<String> = row.get("sender_location_id")?;
    let recipient_person_id: Option<String> = row.get("recipient_person_id")?;
    let created_at: String = row.get("created_at")?;

    Ok(DocumentParse {
        id: ParseId::from_string(&id).map_err(conv_err)?,
        doc_type: row.get("doc_type")?,
        source_file: row.get("source_file")?,
        raw_text: row.get("raw_text")?,
        sender_text: row.get("sender_text")?,
        recipient_text: row.get("recipient_text")?,
        body_text: row.get("body_text")?,
        parsed_sender: serde_json::from_str::<FieldMap>(&parsed_sender).map_err(conv_err)?,
        parsed_recipient: serde_json::from_str::<FieldMap>(&parsed_recipient).map_err(conv_err)?,
        sender_location_id: sender_location_id
            .map(|s| LocationId::from_string(&s).map_err(conv_err))
            .transpose()?,
        recipient_person_id: recipient_person_id
            .map(|s| PersonId::from_string(&s).map_err(conv_err))
            .transpose()?,
        created_at: parse_ts(&created_at).map_err(conv_err)?,
    })
}

fn row_to_review(row: &Row<'_>) -> rusqlite::Result<ReviewQueueItem> {
    let id: String = row.get("id")?;
    let parse_id: String = row.get("parse_id")?;
    let entity_kind: String = row.get("entity_kind")?;
    let query_kind: String = row.get("query_kind")?;
    let fields: String = row.get("fields")?;
    let candidates: String = row.get("candidates")?;
    let status: String = row.get("status")?;
    let resolved_entity_id: Option<String> = row.get("resolved_entity_id")?;
    let reviewed_at: Option<String> = row.get("reviewed_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(ReviewQueueItem {
        id: ReviewId::from_string(&id).map_err(conv_err)?,
        parse_id: ParseId::from_string(&parse_id).map_err(conv_err)?,
        entity_kind: EntityKind::from_str_opt(&entity_kind)
            .ok_or_else(|| bad_column("entity_kind", &entity_kind))?,
        query_kind: QueryKind::from_str_opt(&query_kind)
            .ok_or_else(|| bad_column("query_kind", &query_kind))?,
        fields: serde_json::from_str::<FieldMap>(&fields).map_err(conv_err)?,
        candidates: serde_json::from_str::<Vec<Candidate>>(&candidates).map_err(conv_err)?,
        status: ReviewStatus::from_str_opt(&status)
            .ok_or_else(|| bad_column("status", &status))?,
        resolved_entity_id: resolved_entity_id
            .map(|s| Uuid::parse_str(&s).map_err(conv_err))
            .transpose()?,
        reviewed_by: row.get("reviewed_by")?,
        reviewed_at: reviewed_at
            .map(|s| parse_ts(&s).map_err(conv_err))
            .transpose()?,
        created_at: parse_ts(&created_at).map_err(conv_err)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_person(&self, person: &Person) -> Result<()> {
        debug!("Storing person: {}", person.id);
        let conn = self.lock()?;
        Self::insert_person_tx(&conn, person)
    }

    async fn get_person(&self, id: PersonId) -> Result<Person> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM persons WHERE id = ?1",
            params![id.to_string()],
            row_to_person,
        )
        .optional()?
        .ok_or_else(|| MailroomError::NotFound(format!("person {}", id)))
    }

    async fn find_persons_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        dob: Option<NaiveDate>,
    ) -> Result<Vec<Person>> {
        let conn = self.lock()?;
        let rows = if let Some(dob) = dob {
            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM persons
                WHERE lower(first_name) = lower(?1)
                  AND lower(last_name) = lower(?2)
                  AND dob = ?3
                "#,
            )?;
            let found = stmt.query_map(
                params![first_name, last_name, dob.to_string()],
                row_to_person,
            )?;
            found.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM persons
                WHERE lower(first_name) = lower(?1)
                  AND lower(last_name) = lower(?2)
                "#,
            )?;
            let found = stmt.query_map(params![first_name, last_name], row_to_person)?;
            found.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    async fn list_persons(&self) -> Result<Vec<Person>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM persons ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_person)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn insert_location(&self, location: &Location) -> Result<()> {
        debug!("Storing location: {}", location.id);
        let conn = self.lock()?;
        Self::insert_location_tx(&conn, location)
    }

    async fn get_location(&self, id: LocationId) -> Result<Location> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM locations WHERE id = ?1",
            params![id.to_string()],
            row_to_location,
        )
        .optional()?
        .ok_or_else(|| MailroomError::NotFound(format!("location {}", id)))
    }

    async fn find_locations_by_address(&self, address: &str, zip: &str) -> Result<Vec<Location>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT * FROM locations WHERE address = ?1 AND zip = ?2")?;
        let rows = stmt.query_map(params![address, zip], row_to_location)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn find_locations_by_name(
        &self,
        name: &str,
        city: &str,
        state: &str,
    ) -> Result<Vec<Location>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM locations WHERE name = ?1 AND city = ?2 AND state = ?3")?;
        let rows = stmt.query_map(params![name, city, state], row_to_location)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn list_locations(&self) -> Result<Vec<Location>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM locations ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_location)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn insert_parse(&self, parse: &DocumentParse) -> Result<()> {
        debug!("Storing document parse: {}", parse.id);
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO document_parses (
                id, doc_type, source_file, raw_text, sender_text, recipient_text,
                body_text, parsed_sender, parsed_recipient,
                sender_location_id, recipient_person_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                parse.id.to_string(),
                parse.doc_type,
                parse.source_file,
                parse.raw_text,
                parse.sender_text,
                parse.recipient_text,
                parse.body_text,
                serde_json::to_string(&parse.parsed_sender)?,
                serde_json::to_string(&parse.parsed_recipient)?,
                parse.sender_location_id.map(|id| id.to_string()),
                parse.recipient_person_id.map(|id| id.to_string()),
                parse.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_parse(&self, id: ParseId) -> Result<DocumentParse> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM document_parses WHERE id = ?1",
            params![id.to_string()],
            row_to_parse,
        )
        .optional()?
        .ok_or_else(|| MailroomError::NotFound(format!("document parse {}", id)))
    }

    async fn record_slot_entity(
        &self,
        id: ParseId,
        role: BlockRole,
        entity_id: Uuid,
    ) -> Result<()> {
        let column = match role {
            BlockRole::Sender => "sender_location_id",
            BlockRole::Recipient => "recipient_person_id",
        };
        let conn = self.lock()?;
        let updated = conn.execute(
            &format!("UPDATE document_parses SET {} = ?1 WHERE id = ?2", column),
            params![entity_id.to_string(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(MailroomError::NotFound(format!("document parse {}", id)));
        }
        Ok(())
    }

    async fn insert_review(&self, item: &ReviewQueueItem) -> Result<()> {
        debug!(
            "Queuing review item {} ({}, {})",
            item.id,
            item.entity_kind,
            item.query_kind.as_str()
        );
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO review_queue (
                id, parse_id, entity_kind, query_kind, fields, candidates,
                status, resolved_entity_id, reviewed_by, reviewed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                item.id.to_string(),
                item.parse_id.to_string(),
                item.entity_kind.as_str(),
                item.query_kind.as_str(),
                serde_json::to_string(&item.fields)?,
                serde_json::to_string(&item.candidates)?,
                item.status.as_str(),
                item.resolved_entity_id.map(|id| id.to_string()),
                item.reviewed_by,
                item.reviewed_at.map(|ts| ts.to_rfc3339()),
                item.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_review(&self, id: ReviewId) -> Result<ReviewQueueItem> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM review_queue WHERE id = ?1",
            params![id.to_string()],
            row_to_review,
        )
        .optional()?
        .ok_or_else(|| MailroomError::NotFound(format!("review item {}", id)))
    }

    async fn find_pending_review(
        &self,
        parse_id: ParseId,
        kind: EntityKind,
    ) -> Result<Option<ReviewQueueItem>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                r#"
                SELECT * FROM review_queue
                WHERE parse_id = ?1 AND entity_kind = ?2 AND status = 'pending'
                "#,
                params![parse_id.to_string(), kind.as_str()],
                row_to_review,
            )
            .optional()?)
    }

    async fn list_pending_reviews(
        &self,
        kind: Option<EntityKind>,
    ) -> Result<Vec<ReviewQueueItem>> {
        let conn = self.lock()?;
        let rows = if let Some(kind) = kind {
            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM review_queue
                WHERE status = 'pending' AND entity_kind = ?1
                ORDER BY created_at
                "#,
            )?;
            let found = stmt.query_map(params![kind.as_str()], row_to_review)?;
            found.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT * FROM review_queue WHERE status = 'pending' ORDER BY created_at",
            )?;
            let found = stmt.query_map([], row_to_review)?;
            found.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    async fn close_review(
        &self,
        id: ReviewId,
        outcome: ReviewOutcome,
        reviewer: &str,
    ) -> Result<Option<Uuid>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM review_queue WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let status = status.ok_or_else(|| {
            MailroomError::NotFound(format!("review item {}", id))
        })?;

        if status != ReviewStatus::Pending.as_str() {
            return Err(MailroomError::InvalidState(format!(
                "review item {} is already {}",
                id, status
            )));
        }

        let (new_status, entity_id) = match &outcome {
            ReviewOutcome::PickExisting(entity_id) => (ReviewStatus::Resolved, Some(*entity_id)),
            ReviewOutcome::CreateEntity(entity) => {
                match entity {
                    NewEntity::Person(person) => Self::insert_person_tx(&tx, person)?,
                    NewEntity::Location(location) => Self::insert_location_tx(&tx, location)?,
                }
                (ReviewStatus::Resolved, Some(entity.id()))
            }
            ReviewOutcome::Skip => (ReviewStatus::Skipped, None),
        };

        tx.execute(
            r#"
            UPDATE review_queue
            SET status = ?1, resolved_entity_id = ?2, reviewed_by = ?3, reviewed_at = ?4
            WHERE id = ?5
            "#,
            params![
                new_status.as_str(),
                entity_id.map(|eid| eid.to_string()),
                reviewer,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?;

        tx.commit()?;

        debug!(
            "Review item {} closed as {} by {}",
            id,
            new_status.as_str(),
            reviewer
        );

        Ok(entity_id)
    }

    async fn delete_review(&self, id: ReviewId) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM review_queue WHERE id = ?1",
            params![id.to_string()],
        )?;
        if deleted == 0 {
            return Err(MailroomError::NotFound(format!("review item {}", id)));
        }
        Ok(())
    }

    async fn review_stats(&self) -> Result<ReviewStats> {
        let conn = self.lock()?;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(ReviewStats {
            total_pending: count("SELECT COUNT(*) FROM review_queue WHERE status = 'pending'")?,
            total_resolved: count("SELECT COUNT(*) FROM review_queue WHERE status = 'resolved'")?,
            total_skipped: count("SELECT COUNT(*) FROM review_queue WHERE status = 'skipped'")?,
            pending_persons: count(
                "SELECT COUNT(*) FROM review_queue WHERE status = 'pending' AND entity_kind = 'person'",
            )?,
            pending_locations: count(
                "SELECT COUNT(*) FROM review_queue WHERE status = 'pending' AND entity_kind = 'location'",
            )?,
            pending_no_results: count(
                "SELECT COUNT(*) FROM review_queue WHERE status = 'pending' AND query_kind = 'no_results'",
            )?,
            pending_multiple_results: count(
                "SELECT COUNT(*) FROM review_queue WHERE status = 'pending' AND query_kind = 'multiple_results'",
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_dob;

    fn sample_parse() -> DocumentParse {
        DocumentParse {
            id: ParseId::new(),
            doc_type: Some("letter".to_string()),
            source_file: None,
            raw_text: "raw".to_string(),
            sender_text: Some("Acme Corp\n1 Main St".to_string()),
            recipient_text: Some("Jane Doe".to_string()),
            body_text: "body".to_string(),
            parsed_sender: FieldMap::new(),
            parsed_recipient: FieldMap::new(),
            sender_location_id: None,
            recipient_person_id: None,
            created_at: Utc::now(),
        }
    }

    fn pending_item(parse_id: ParseId) -> ReviewQueueItem {
        ReviewQueueItem {
            id: ReviewId::new(),
            parse_id,
            entity_kind: EntityKind::Person,
            query_kind: QueryKind::NoResults,
            fields: FieldMap::new(),
            candidates: vec![],
            status: ReviewStatus::Pending,
            resolved_entity_id: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_person_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();

        let person = Person::new(
            "Heather".to_string(),
            "Lindqvist".to_string(),
            parse_dob("1990-06-15"),
        );
        store.insert_person(&person).await.unwrap();

        let loaded = store.get_person(person.id).await.unwrap();
        assert_eq!(loaded.first_name, "Heather");
        assert_eq!(loaded.dob, parse_dob("1990-06-15"));
    }

    #[tokio::test]
    async fn test_person_name_query_is_case_insensitive() {
        let store = SqliteStore::open_in_memory().unwrap();
        let person = Person::new("James".to_string(), "Ostlie".to_string(), None);
        store.insert_person(&person).await.unwrap();

        let found = store
            .find_persons_by_name("james", "OSTLIE", None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, person.id);
    }

    #[tokio::test]
    async fn test_location_exact_queries() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut location = Location::new("Davey Tree".to_string());
        location.address = Some("1500 N Mantua St".to_string());
        location.city = Some("Kent".to_string());
        location.state = Some("OH".to_string());
        location.zip = Some("44240".to_string());
        store.insert_location(&location).await.unwrap();

        let by_address = store
            .find_locations_by_address("1500 N Mantua St", "44240")
            .await
            .unwrap();
        assert_eq!(by_address.len(), 1);

        let by_name = store
            .find_locations_by_name("Davey Tree", "Kent", "OH")
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let miss = store
            .find_locations_by_name("Davey Tree", "Akron", "OH")
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn test_parse_slot_writeback() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parse = sample_parse();
        store.insert_parse(&parse).await.unwrap();

        let person = Person::new("Jane".to_string(), "Doe".to_string(), None);
        store.insert_person(&person).await.unwrap();
        store
            .record_slot_entity(parse.id, BlockRole::Recipient, person.id.0)
            .await
            .unwrap();

        let loaded = store.get_parse(parse.id).await.unwrap();
        assert_eq!(loaded.recipient_person_id, Some(person.id));
        assert_eq!(loaded.sender_location_id, None);
    }

    #[tokio::test]
    async fn test_close_review_is_single_shot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parse = sample_parse();
        store.insert_parse(&parse).await.unwrap();

        let item = pending_item(parse.id);
        store.insert_review(&item).await.unwrap();

        let person = Person::new("Jane".to_string(), "Doe".to_string(), None);
        let resolved = store
            .close_review(
                item.id,
                ReviewOutcome::CreateEntity(NewEntity::Person(person.clone())),
                "reviewer-1",
            )
            .await
            .unwrap();
        assert_eq!(resolved, Some(person.id.0));

        // Created entity persisted with the transition
        assert!(store.get_person(person.id).await.is_ok());

        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.status, ReviewStatus::Resolved);
        assert_eq!(loaded.reviewed_by.as_deref(), Some("reviewer-1"));
        let first_reviewed_at = loaded.reviewed_at;

        // Second close must fail and leave the first decision untouched
        let err = store
            .close_review(
                item.id,
                ReviewOutcome::PickExisting(Uuid::new_v4()),
                "reviewer-2",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidState(_)));

        let unchanged = store.get_review(item.id).await.unwrap();
        assert_eq!(unchanged.resolved_entity_id, Some(person.id.0));
        assert_eq!(unchanged.reviewed_by.as_deref(), Some("reviewer-1"));
        assert_eq!(unchanged.reviewed_at, first_reviewed_at);
    }

    #[tokio::test]
    async fn test_skip_records_no_entity() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parse = sample_parse();
        store.insert_parse(&parse).await.unwrap();
        let item = pending_item(parse.id);
        store.insert_review(&item).await.unwrap();

        let resolved = store
            .close_review(item.id, ReviewOutcome::Skip, "reviewer-1")
            .await
            .unwrap();
        assert_eq!(resolved, None);

        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.status, ReviewStatus::Skipped);
        assert_eq!(loaded.resolved_entity_id, None);
    }

    #[tokio::test]
    async fn test_pending_slot_lookup_and_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parse = sample_parse();
        store.insert_parse(&parse).await.unwrap();
        let item = pending_item(parse.id);
        store.insert_review(&item).await.unwrap();

        let open = store
            .find_pending_review(parse.id, EntityKind::Person)
            .await
            .unwrap();
        assert_eq!(open.map(|i| i.id), Some(item.id));

        let none = store
            .find_pending_review(parse.id, EntityKind::Location)
            .await
            .unwrap();
        assert!(none.is_none());

        let stats = store.review_stats().await.unwrap();
        assert_eq!(stats.total_pending, 1);
        assert_eq!(stats.pending_persons, 1);
        assert_eq!(stats.pending_no_results, 1);
        assert_eq!(stats.pending_multiple_results, 0);
    }
}
