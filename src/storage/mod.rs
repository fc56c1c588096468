//! Storage layer for canonical entities, document parses, and the review queue
//!
//! The resolver and review queue talk to storage through this trait only.
//! Deterministic-match predicates are plain exact queries; "exactly one row"
//! acceptance is decided by the caller. Concurrent uploads racing to create
//! the same entity are an accepted risk at this layer; deployments wanting a
//! backstop should add a uniqueness constraint on the deterministic-match
//! predicates at the storage boundary.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{
    BlockRole, DocumentParse, EntityKind, Location, LocationId, NewEntity, ParseId, Person,
    PersonId, ReviewId, ReviewQueueItem, ReviewStats,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

/// How a pending review item is being closed
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    /// Link to an existing entity
    PickExisting(Uuid),
    /// Persist a new entity atomically with the status transition
    CreateEntity(NewEntity),
    /// Terminal close with no entity recorded
    Skip,
}

/// Storage contract for the resolution pipeline
#[async_trait]
pub trait Store: Send + Sync {
    // === Persons ===

    async fn insert_person(&self, person: &Person) -> Result<()>;

    async fn get_person(&self, id: PersonId) -> Result<Person>;

    /// Case-insensitive exact match on given+family name, optionally
    /// constrained to an exact birth date
    async fn find_persons_by_name(
        &self,
        first_name: &str,
        last_name: &str,
        dob: Option<NaiveDate>,
    ) -> Result<Vec<Person>>;

    async fn list_persons(&self) -> Result<Vec<Person>>;

    // === Locations ===

    async fn insert_location(&self, location: &Location) -> Result<()>;

    async fn get_location(&self, id: LocationId) -> Result<Location>;

    /// Exact match on address + postal code
    async fn find_locations_by_address(&self, address: &str, zip: &str) -> Result<Vec<Location>>;

    /// Exact match on name + city + state
    async fn find_locations_by_name(
        &self,
        name: &str,
        city: &str,
        state: &str,
    ) -> Result<Vec<Location>>;

    async fn list_locations(&self) -> Result<Vec<Location>>;

    // === Document parses ===

    async fn insert_parse(&self, parse: &DocumentParse) -> Result<()>;

    async fn get_parse(&self, id: ParseId) -> Result<DocumentParse>;

    /// Write a resolved entity id onto a parse slot. The resolution pass
    /// calls this once per slot; review resolution does not call it — that
    /// reconciliation is an explicit follow-up owned by the caller.
    async fn record_slot_entity(
        &self,
        id: ParseId,
        role: BlockRole,
        entity_id: Uuid,
    ) -> Result<()>;

    // === Review queue ===

    async fn insert_review(&self, item: &ReviewQueueItem) -> Result<()>;

    async fn get_review(&self, id: ReviewId) -> Result<ReviewQueueItem>;

    /// The pending item for a parse slot, if one is already open. Used to
    /// guarantee a slot never has two open items.
    async fn find_pending_review(
        &self,
        parse_id: ParseId,
        kind: EntityKind,
    ) -> Result<Option<ReviewQueueItem>>;

    async fn list_pending_reviews(&self, kind: Option<EntityKind>)
        -> Result<Vec<ReviewQueueItem>>;

    /// Atomically transition a pending item to resolved/skipped, persisting
    /// any new entity in the same transaction. Fails with an invalid-state
    /// error (leaving all state untouched) when the item is not pending.
    ///
    /// Returns the resolved entity id, or None for a skip.
    async fn close_review(
        &self,
        id: ReviewId,
        outcome: ReviewOutcome,
        reviewer: &str,
    ) -> Result<Option<Uuid>>;

    /// Admin removal of a queue item
    async fn delete_review(&self, id: ReviewId) -> Result<()>;

    async fn review_stats(&self) -> Result<ReviewStats>;
}
