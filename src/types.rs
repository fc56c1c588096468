//! Core data types for the mailroom resolution pipeline
//!
//! Defines the canonical entity records (Person, Location), the per-document
//! parse record, the review-queue item and its lifecycle, and the small
//! vocabulary shared between the extractor and the resolver.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Flat field mapping produced by extraction and consumed by resolution.
///
/// Absent fields are missing keys, never empty strings or nulls.
pub type FieldMap = BTreeMap<String, String>;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an ID from a string
            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id! {
    /// Unique identifier for a canonical Person record
    PersonId
}

entity_id! {
    /// Unique identifier for a canonical Location record
    LocationId
}

entity_id! {
    /// Unique identifier for a DocumentParse record
    ParseId
}

entity_id! {
    /// Unique identifier for a ReviewQueueItem
    ReviewId
}

/// The two entity kinds the resolver handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Location,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Location => "location",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "person" => Some(EntityKind::Person),
            "location" => Some(EntityKind::Location),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which side of the document a field mapping came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRole {
    Sender,
    Recipient,
}

impl BlockRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockRole::Sender => "sender",
            BlockRole::Recipient => "recipient",
        }
    }

    /// The entity kind a slot of this role resolves to
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            BlockRole::Sender => EntityKind::Location,
            BlockRole::Recipient => EntityKind::Person,
        }
    }
}

/// Why a resolution was deferred to review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// No deterministic or semantic candidate found
    NoResults,
    /// More than one semantic candidate above threshold
    MultipleResults,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::NoResults => "no_results",
            QueryKind::MultipleResults => "multiple_results",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "no_results" => Some(QueryKind::NoResults),
            "multiple_results" => Some(QueryKind::MultipleResults),
            _ => None,
        }
    }
}

/// Review-queue lifecycle. Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Resolved,
    Skipped,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Resolved => "resolved",
            ReviewStatus::Skipped => "skipped",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "resolved" => Some(ReviewStatus::Resolved),
            "skipped" => Some(ReviewStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::Pending)
    }
}

/// Canonical identity record for an individual in care
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,

    /// Opaque flag bag (e.g. guardianship status). Never matched on.
    pub legal_flags: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl Person {
    pub fn new(first_name: String, last_name: String, dob: Option<NaiveDate>) -> Self {
        Self {
            id: PersonId::new(),
            first_name,
            last_name,
            dob,
            legal_flags: None,
            created_at: Utc::now(),
        }
    }

    /// Identity text used for semantic matching
    pub fn identity_text(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Canonical organization/address record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,

    /// Optional geocoordinate reference (latitude, longitude). Opaque to matching.
    pub geo: Option<(f64, f64)>,

    pub created_at: DateTime<Utc>,
}

impl Location {
    pub fn new(name: String) -> Self {
        Self {
            id: LocationId::new(),
            name,
            address: None,
            city: None,
            state: None,
            zip: None,
            country: None,
            phone: None,
            email: None,
            website: None,
            geo: None,
            created_at: Utc::now(),
        }
    }

    /// Identity text used for semantic matching
    pub fn identity_text(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if let Some(ref address) = self.address {
            parts.push(address.clone());
        }
        if let Some(ref city) = self.city {
            parts.push(city.clone());
        }
        if let Some(ref state) = self.state {
            parts.push(state.clone());
        }
        parts.join(" ")
    }
}

/// One record per ingested document: raw blocks plus extracted field maps.
///
/// Entity ids are written back once by the resolution pass; the record is
/// never mutated after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentParse {
    pub id: ParseId,
    pub doc_type: Option<String>,
    pub source_file: Option<String>,
    pub raw_text: String,
    pub sender_text: Option<String>,
    pub recipient_text: Option<String>,
    pub body_text: String,
    pub parsed_sender: FieldMap,
    pub parsed_recipient: FieldMap,
    pub sender_location_id: Option<LocationId>,
    pub recipient_person_id: Option<PersonId>,
    pub created_at: DateTime<Utc>,
}

/// Ranked candidate attached to a review item for human inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_id: Uuid,

    /// Core display fields (name parts for persons; name/address/city/state
    /// for locations)
    pub display: FieldMap,

    /// Cosine similarity against the search string
    pub similarity: f32,
}

/// One adjudication task per entity slot resolution could not close
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: ReviewId,
    pub parse_id: ParseId,
    pub entity_kind: EntityKind,
    pub query_kind: QueryKind,

    /// Normalized field mapping captured at queue time
    pub fields: FieldMap,

    /// Ranked candidates, best first, at most five
    pub candidates: Vec<Candidate>,

    pub status: ReviewStatus,
    pub resolved_entity_id: Option<Uuid>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a resolution attempt: either a canonical entity id, or the
/// review item now holding the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Matched(Uuid),
    Queued(ReviewId),
}

impl Resolution {
    pub fn matched_id(&self) -> Option<Uuid> {
        match self {
            Resolution::Matched(id) => Some(*id),
            Resolution::Queued(_) => None,
        }
    }
}

/// Reviewer decision on a pending item
#[derive(Debug, Clone)]
pub enum ReviewDecision {
    /// Link the slot to an existing entity
    Pick { entity_id: Uuid },
    /// Create a new entity of the item's declared kind from the given fields
    Create { fields: FieldMap },
    /// Close the item without recording an entity
    Skip,
}

/// A new entity to persist atomically with a review-item transition
#[derive(Debug, Clone)]
pub enum NewEntity {
    Person(Person),
    Location(Location),
}

impl NewEntity {
    pub fn id(&self) -> Uuid {
        match self {
            NewEntity::Person(p) => p.id.0,
            NewEntity::Location(l) => l.id.0,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            NewEntity::Person(_) => EntityKind::Person,
            NewEntity::Location(_) => EntityKind::Location,
        }
    }
}

/// Review-queue counts by status, entity kind, and query kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total_pending: usize,
    pub total_resolved: usize,
    pub total_skipped: usize,
    pub pending_persons: usize,
    pub pending_locations: usize,
    pub pending_no_results: usize,
    pub pending_multiple_results: usize,
}

/// Parse a date-of-birth string in `YYYY-MM-DD` or `MM/DD/YYYY` form
pub fn parse_dob(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_uniqueness() {
        assert_ne!(PersonId::new(), PersonId::new());
        assert_ne!(ReviewId::new(), ReviewId::new());
    }

    #[test]
    fn test_id_roundtrip() {
        let id = LocationId::new();
        let parsed = LocationId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_block_role_entity_kind() {
        assert_eq!(BlockRole::Sender.entity_kind(), EntityKind::Location);
        assert_eq!(BlockRole::Recipient.entity_kind(), EntityKind::Person);
    }

    #[test]
    fn test_review_status_terminal() {
        assert!(!ReviewStatus::Pending.is_terminal());
        assert!(ReviewStatus::Resolved.is_terminal());
        assert!(ReviewStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_parse_dob_formats() {
        assert_eq!(
            parse_dob("1984-03-09"),
            NaiveDate::from_ymd_opt(1984, 3, 9)
        );
        assert_eq!(
            parse_dob("03/09/1984"),
            NaiveDate::from_ymd_opt(1984, 3, 9)
        );
        assert_eq!(parse_dob("March 9, 1984"), None);
    }

    #[test]
    fn test_location_identity_text() {
        let mut loc = Location::new("Davey Tree Expert Co".to_string());
        loc.address = Some("1500 N Mantua St".to_string());
        loc.city = Some("Kent".to_string());
        loc.state = Some("OH".to_string());
        assert_eq!(
            loc.identity_text(),
            "Davey Tree Expert Co 1500 N Mantua St Kent OH"
        );
    }
}
