//! Manual review queue
//!
//! Adjudication tasks for entity slots the resolver could not close
//! automatically. The state machine is `pending → resolved | skipped`, both
//! terminal; resolving a non-pending item is an invalid-state error and
//! leaves the prior decision untouched.
//!
//! Resolving does NOT write the entity id back onto the originating
//! document parse; that reconciliation is an explicit follow-up owned by
//! the caller (see `Store::record_slot_entity`).

use crate::error::{MailroomError, Result};
use crate::storage::{ReviewOutcome, Store};
use crate::types::{
    parse_dob, EntityKind, FieldMap, Location, NewEntity, ParseId, Person, ReviewDecision,
    ReviewId, ReviewQueueItem, ReviewStats,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Review item with the source document context a reviewer needs
#[derive(Debug, Clone)]
pub struct ReviewDetail {
    pub item: ReviewQueueItem,
    pub document: DocumentContext,
}

/// The blocks of the originating document parse
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub parse_id: ParseId,
    pub doc_type: Option<String>,
    pub sender_text: Option<String>,
    pub recipient_text: Option<String>,
}

/// Human-adjudication queue over unresolved entity slots
pub struct ReviewQueue {
    store: Arc<dyn Store>,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// All pending items, oldest first, optionally filtered by entity kind
    pub async fn list_pending(&self, kind: Option<EntityKind>) -> Result<Vec<ReviewQueueItem>> {
        self.store.list_pending_reviews(kind).await
    }

    /// One item with its source document context
    pub async fn get(&self, id: ReviewId) -> Result<ReviewDetail> {
        let item = self.store.get_review(id).await?;
        let parse = self.store.get_parse(item.parse_id).await?;

        Ok(ReviewDetail {
            item,
            document: DocumentContext {
                parse_id: parse.id,
                doc_type: parse.doc_type,
                sender_text: parse.sender_text,
                recipient_text: parse.recipient_text,
            },
        })
    }

    /// Apply a reviewer decision to a pending item.
    ///
    /// Returns the resolved entity id (existing or newly created), or None
    /// for a skip. The status transition and any entity creation commit
    /// atomically.
    pub async fn resolve(
        &self,
        id: ReviewId,
        decision: ReviewDecision,
        reviewer: &str,
    ) -> Result<Option<Uuid>> {
        if reviewer.trim().is_empty() {
            return Err(MailroomError::InvalidInput(
                "reviewer identity is required".to_string(),
            ));
        }

        let item = self.store.get_review(id).await?;

        let outcome = match decision {
            ReviewDecision::Pick { entity_id } => {
                // Validate the pick before touching the item
                match item.entity_kind {
                    EntityKind::Person => {
                        self.store
                            .get_person(crate::types::PersonId(entity_id))
                            .await?;
                    }
                    EntityKind::Location => {
                        self.store
                            .get_location(crate::types::LocationId(entity_id))
                            .await?;
                    }
                }
                ReviewOutcome::PickExisting(entity_id)
            }
            ReviewDecision::Create { fields } => {
                let entity = build_entity(item.entity_kind, &fields)?;
                ReviewOutcome::CreateEntity(entity)
            }
            ReviewDecision::Skip => ReviewOutcome::Skip,
        };

        let resolved = self.store.close_review(id, outcome, reviewer).await?;
        info!(
            "Review item {} resolved by {} -> {:?}",
            id, reviewer, resolved
        );
        Ok(resolved)
    }

    /// Counts by status, entity kind, and query kind
    pub async fn stats(&self) -> Result<ReviewStats> {
        self.store.review_stats().await
    }

    /// Admin removal of an item
    pub async fn delete(&self, id: ReviewId) -> Result<()> {
        self.store.delete_review(id).await
    }
}

/// Build a new entity of the item's declared kind from reviewer-supplied
/// fields; malformed data is rejected before any state is committed.
fn build_entity(kind: EntityKind, fields: &FieldMap) -> Result<NewEntity> {
    match kind {
        EntityKind::Person => {
            let first = fields
                .get("first_name")
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    MailroomError::InvalidInput("first_name is required for a new person".into())
                })?;
            let last = fields
                .get("last_name")
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    MailroomError::InvalidInput("last_name is required for a new person".into())
                })?;

            let dob = match fields.get("dob") {
                Some(raw) => Some(parse_dob(raw).ok_or_else(|| {
                    MailroomError::InvalidInput(format!(
                        "unparseable date of birth: {} (expected YYYY-MM-DD or MM/DD/YYYY)",
                        raw
                    ))
                })?),
                None => None,
            };

            Ok(NewEntity::Person(Person::new(
                first.clone(),
                last.clone(),
                dob,
            )))
        }
        EntityKind::Location => {
            let name = fields
                .get("name")
                .or_else(|| fields.get("organization_name"))
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    MailroomError::InvalidInput("name is required for a new location".into())
                })?;

            let mut location = Location::new(name.clone());
            location.address = fields.get("address").cloned();
            location.city = fields.get("city").cloned();
            location.state = fields.get("state").cloned();
            location.zip = fields.get("zip").cloned();
            location.country = fields.get("country").cloned();
            location.phone = fields.get("phone").cloned();
            location.email = fields.get("email").cloned();
            location.website = fields.get("website").cloned();

            Ok(NewEntity::Location(location))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use crate::types::{Candidate, DocumentParse, QueryKind, ReviewStatus};
    use chrono::Utc;

    async fn setup() -> (Arc<SqliteStore>, ReviewQueue, ParseId) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let parse = DocumentParse {
            id: ParseId::new(),
            doc_type: Some("letter".to_string()),
            source_file: None,
            raw_text: "raw".to_string(),
            sender_text: Some("Acme Corp".to_string()),
            recipient_text: Some("Jane Doe".to_string()),
            body_text: "body".to_string(),
            parsed_sender: FieldMap::new(),
            parsed_recipient: FieldMap::new(),
            sender_location_id: None,
            recipient_person_id: None,
            created_at: Utc::now(),
        };
        store.insert_parse(&parse).await.unwrap();
        let queue = ReviewQueue::new(store.clone());
        (store, queue, parse.id)
    }

    async fn queue_item(
        store: &SqliteStore,
        parse_id: ParseId,
        kind: EntityKind,
    ) -> ReviewQueueItem {
        let item = ReviewQueueItem {
            id: ReviewId::new(),
            parse_id,
            entity_kind: kind,
            query_kind: QueryKind::NoResults,
            fields: FieldMap::new(),
            candidates: Vec::<Candidate>::new(),
            status: ReviewStatus::Pending,
            resolved_entity_id: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        store.insert_review(&item).await.unwrap();
        item
    }

    #[tokio::test]
    async fn test_pick_existing_entity() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Person).await;

        let person = Person::new("Jane".to_string(), "Doe".to_string(), None);
        store.insert_person(&person).await.unwrap();

        let resolved = queue
            .resolve(
                item.id,
                ReviewDecision::Pick {
                    entity_id: person.id.0,
                },
                "alex",
            )
            .await
            .unwrap();
        assert_eq!(resolved, Some(person.id.0));

        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.status, ReviewStatus::Resolved);
        assert_eq!(loaded.resolved_entity_id, Some(person.id.0));
    }

    #[tokio::test]
    async fn test_pick_nonexistent_entity_leaves_item_pending() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Person).await;

        let err = queue
            .resolve(
                item.id,
                ReviewDecision::Pick {
                    entity_id: Uuid::new_v4(),
                },
                "alex",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::NotFound(_)));

        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_location_from_review() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Location).await;

        let mut fields = FieldMap::new();
        fields.insert("organization_name".to_string(), "Davey Tree".to_string());
        fields.insert("city".to_string(), "Kent".to_string());
        fields.insert("state".to_string(), "OH".to_string());

        let resolved = queue
            .resolve(item.id, ReviewDecision::Create { fields }, "alex")
            .await
            .unwrap()
            .expect("entity id");

        let location = store
            .get_location(crate::types::LocationId(resolved))
            .await
            .unwrap();
        assert_eq!(location.name, "Davey Tree");
        assert_eq!(location.city.as_deref(), Some("Kent"));
    }

    #[tokio::test]
    async fn test_create_person_rejects_bad_dob() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Person).await;

        let mut fields = FieldMap::new();
        fields.insert("first_name".to_string(), "Jane".to_string());
        fields.insert("last_name".to_string(), "Doe".to_string());
        fields.insert("dob".to_string(), "sometime in March".to_string());

        let err = queue
            .resolve(item.id, ReviewDecision::Create { fields }, "alex")
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidInput(_)));

        // Nothing committed
        assert!(store.list_persons().await.unwrap().is_empty());
        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_resolution_is_invalid_state() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Person).await;

        let mut fields = FieldMap::new();
        fields.insert("first_name".to_string(), "Jane".to_string());
        fields.insert("last_name".to_string(), "Doe".to_string());

        let first = queue
            .resolve(
                item.id,
                ReviewDecision::Create {
                    fields: fields.clone(),
                },
                "alex",
            )
            .await
            .unwrap();

        let err = queue
            .resolve(item.id, ReviewDecision::Skip, "blake")
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidState(_)));

        // First decision untouched
        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.resolved_entity_id, first);
        assert_eq!(loaded.reviewed_by.as_deref(), Some("alex"));
    }

    #[tokio::test]
    async fn test_skip_is_terminal_without_entity() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Location).await;

        let resolved = queue
            .resolve(item.id, ReviewDecision::Skip, "alex")
            .await
            .unwrap();
        assert_eq!(resolved, None);

        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.status, ReviewStatus::Skipped);
        assert!(loaded.reviewed_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_reviewer_rejected() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Person).await;

        let err = queue
            .resolve(item.id, ReviewDecision::Skip, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidInput(_)));

        let loaded = store.get_review(item.id).await.unwrap();
        assert_eq!(loaded.status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_detail_includes_document_context() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Person).await;

        let detail = queue.get(item.id).await.unwrap();
        assert_eq!(detail.document.parse_id, parse_id);
        assert_eq!(detail.document.doc_type.as_deref(), Some("letter"));
        assert_eq!(detail.document.recipient_text.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn test_delete_and_missing_item() {
        let (store, queue, parse_id) = setup().await;
        let item = queue_item(&store, parse_id, EntityKind::Person).await;

        queue.delete(item.id).await.unwrap();
        let err = queue.get(item.id).await.unwrap_err();
        assert!(matches!(err, MailroomError::NotFound(_)));

        let err = queue
            .resolve(ReviewId::new(), ReviewDecision::Skip, "alex")
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::NotFound(_)));
    }
}
