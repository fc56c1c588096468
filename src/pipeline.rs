//! Document ingestion pipeline
//!
//! One logical unit of work per upload: segmentation, per-block extraction,
//! sequential sender/recipient resolution, and the single write-back of
//! matched entity ids onto the parse record. Manual per-slot overrides merge
//! over extracted fields before resolution; malformed override data is
//! rejected before anything is persisted.

use crate::capabilities::Capabilities;
use crate::config::Settings;
use crate::embeddings::EmbeddingBackend;
use crate::error::{MailroomError, Result};
use crate::extractor::FieldExtractor;
use crate::resolver::{normalize, EntityResolver};
use crate::segmenter::TextSegmenter;
use crate::services::AssistClient;
use crate::storage::Store;
use crate::types::{
    BlockRole, DocumentParse, FieldMap, LocationId, ParseId, PersonId, Resolution, ReviewId,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

const BODY_PREVIEW_CHARS: usize = 200;

/// Per-upload options
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Caller-supplied document type; falls back to the segmenter's hint
    pub doc_type: Option<String>,

    /// Original file name, used as a segmentation hint and recorded on the
    /// parse
    pub source_file: Option<String>,

    /// Manual override JSON: `{"sender": {...}, "recipient": {...}}`.
    /// Override fields win over extracted ones.
    pub manual_overrides: Option<String>,
}

/// Outcome of one ingestion
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub parse_id: ParseId,
    pub doc_type: Option<String>,
    pub sender_location_id: Option<LocationId>,
    pub recipient_person_id: Option<PersonId>,
    pub pending_reviews: Vec<ReviewId>,
    pub body_preview: String,
}

/// Segmentation → extraction → resolution for one document
pub struct DocumentPipeline {
    store: Arc<dyn Store>,
    segmenter: TextSegmenter,
    extractor: FieldExtractor,
    resolver: EntityResolver,
}

impl DocumentPipeline {
    /// Wire the pipeline from settings and the startup capability probe
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Option<Arc<dyn EmbeddingBackend>>,
        settings: &Settings,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let assist = if capabilities.segment_assist || capabilities.extract_assist {
            Some(Arc::new(AssistClient::new(settings.assist.clone())?))
        } else {
            None
        };

        let segmenter = TextSegmenter::new(
            assist.clone().filter(|_| capabilities.segment_assist),
        );
        let extractor = FieldExtractor::new(assist.filter(|_| capabilities.extract_assist));
        let resolver = EntityResolver::new(
            store.clone(),
            embedder.filter(|_| capabilities.embeddings),
            settings.resolver.clone(),
        );

        Ok(Self {
            store,
            segmenter,
            extractor,
            resolver,
        })
    }

    /// Explicit wiring, used by tests and embedders of the crate
    pub fn with_components(
        store: Arc<dyn Store>,
        segmenter: TextSegmenter,
        extractor: FieldExtractor,
        resolver: EntityResolver,
    ) -> Self {
        Self {
            store,
            segmenter,
            extractor,
            resolver,
        }
    }

    /// Ingest one document's raw text
    pub async fn ingest(&self, raw_text: &str, options: IngestOptions) -> Result<IngestReport> {
        // Validate overrides before any state is committed
        let overrides = parse_overrides(options.manual_overrides.as_deref())?;

        let segments = self
            .segmenter
            .segment(raw_text, options.source_file.as_deref())
            .await;

        let sender_fields = match segments.sender.as_deref() {
            Some(block) => self.extractor.extract(block, BlockRole::Sender).await,
            None => FieldMap::new(),
        };
        let recipient_fields = match segments.recipient.as_deref() {
            Some(block) => self.extractor.extract(block, BlockRole::Recipient).await,
            None => FieldMap::new(),
        };

        let sender_data = merge_overrides(sender_fields, overrides.sender);
        let recipient_data = merge_overrides(recipient_fields, overrides.recipient);

        let doc_type = options.doc_type.or(segments.doc_type_hint);

        let parse = DocumentParse {
            id: ParseId::new(),
            doc_type: doc_type.clone(),
            source_file: options.source_file,
            raw_text: raw_text.to_string(),
            sender_text: segments.sender,
            recipient_text: segments.recipient,
            body_text: segments.body.clone(),
            parsed_sender: normalize(&sender_data),
            parsed_recipient: normalize(&recipient_data),
            sender_location_id: None,
            recipient_person_id: None,
            created_at: Utc::now(),
        };
        self.store.insert_parse(&parse).await?;
        debug!("document parse {} stored", parse.id);

        let mut pending_reviews = Vec::new();

        // Sender and recipient slots resolve sequentially within this unit
        // of work; there is no intra-document parallelism.
        let mut sender_location_id = None;
        if !sender_data.is_empty() {
            match self.resolver.resolve_sender(&sender_data, parse.id).await? {
                Resolution::Matched(id) => {
                    let id = LocationId(id);
                    self.store
                        .record_slot_entity(parse.id, BlockRole::Sender, id.0)
                        .await?;
                    sender_location_id = Some(id);
                }
                Resolution::Queued(review_id) => pending_reviews.push(review_id),
            }
        }

        let mut recipient_person_id = None;
        if !recipient_data.is_empty() {
            match self
                .resolver
                .resolve_recipient(&recipient_data, parse.id)
                .await?
            {
                Resolution::Matched(id) => {
                    let id = PersonId(id);
                    self.store
                        .record_slot_entity(parse.id, BlockRole::Recipient, id.0)
                        .await?;
                    recipient_person_id = Some(id);
                }
                Resolution::Queued(review_id) => pending_reviews.push(review_id),
            }
        }

        info!(
            "ingested parse {}: sender={:?} recipient={:?} reviews={}",
            parse.id,
            sender_location_id,
            recipient_person_id,
            pending_reviews.len()
        );

        Ok(IngestReport {
            parse_id: parse.id,
            doc_type,
            sender_location_id,
            recipient_person_id,
            pending_reviews,
            body_preview: preview(&segments.body),
        })
    }
}

#[derive(Default)]
struct Overrides {
    sender: Option<serde_json::Map<String, serde_json::Value>>,
    recipient: Option<serde_json::Map<String, serde_json::Value>>,
}

fn parse_overrides(raw: Option<&str>) -> Result<Overrides> {
    let Some(raw) = raw else {
        return Ok(Overrides::default());
    };

    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| MailroomError::InvalidInput(format!("malformed manual override JSON: {}", e)))?;

    let serde_json::Value::Object(mut map) = value else {
        return Err(MailroomError::InvalidInput(
            "manual overrides must be a JSON object".to_string(),
        ));
    };

    let mut slot = |key: &str| -> Result<Option<serde_json::Map<String, serde_json::Value>>> {
        match map.remove(key) {
            None => Ok(None),
            Some(serde_json::Value::Object(fields)) => Ok(Some(fields)),
            Some(_) => Err(MailroomError::InvalidInput(format!(
                "manual override '{}' must be a JSON object",
                key
            ))),
        }
    };

    Ok(Overrides {
        sender: slot("sender")?,
        recipient: slot("recipient")?,
    })
}

/// Extracted fields as JSON, with override fields winning
fn merge_overrides(
    extracted: FieldMap,
    overrides: Option<serde_json::Map<String, serde_json::Value>>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut data: serde_json::Map<String, serde_json::Value> = extracted
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();

    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            data.insert(key, value);
        }
    }

    data
}

fn preview(body: &str) -> String {
    if body.chars().count() > BODY_PREVIEW_CHARS {
        let truncated: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::storage::SqliteStore;
    use crate::types::{Location, Person, QueryKind};

    fn heuristic_pipeline(store: Arc<SqliteStore>) -> DocumentPipeline {
        DocumentPipeline::with_components(
            store.clone(),
            TextSegmenter::heuristic_only(),
            FieldExtractor::regex_only(),
            EntityResolver::new(store, None, ResolverConfig::default()),
        )
    }

    const LETTER: &str = "Davey Tree Expert Co\n\
        1500 Mantua Street, Kent, OH 44240\n\
        \n\
        John Smith\n\
        123 Oak St\n\
        City, ST 00000\n\
        \n\
        Dear John,\n\
        Please find the quote for the oak removal attached.";

    #[tokio::test]
    async fn test_ingest_matches_seeded_entities() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        let mut location = Location::new("Davey Tree Expert Co".to_string());
        location.address = Some("1500 Mantua Street".to_string());
        location.zip = Some("44240".to_string());
        store.insert_location(&location).await.unwrap();

        let person = Person::new("John".to_string(), "Smith".to_string(), None);
        store.insert_person(&person).await.unwrap();

        let pipeline = heuristic_pipeline(store.clone());
        let report = pipeline
            .ingest(LETTER, IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(report.sender_location_id, Some(location.id));
        assert_eq!(report.recipient_person_id, Some(person.id));
        assert!(report.pending_reviews.is_empty());
        assert!(report.body_preview.starts_with("Dear John,"));

        // Matched ids written back onto the parse record
        let parse = store.get_parse(report.parse_id).await.unwrap();
        assert_eq!(parse.sender_location_id, Some(location.id));
        assert_eq!(parse.recipient_person_id, Some(person.id));
    }

    #[tokio::test]
    async fn test_ingest_unknown_sender_queues_location_review() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let pipeline = heuristic_pipeline(store.clone());

        let report = pipeline
            .ingest(LETTER, IngestOptions::default())
            .await
            .unwrap();

        // Unknown location queues; unknown fully-named person auto-creates
        assert_eq!(report.sender_location_id, None);
        assert!(report.recipient_person_id.is_some());
        assert_eq!(report.pending_reviews.len(), 1);

        let item = store.get_review(report.pending_reviews[0]).await.unwrap();
        assert_eq!(item.query_kind, QueryKind::NoResults);
        assert_eq!(item.parse_id, report.parse_id);
    }

    #[tokio::test]
    async fn test_malformed_overrides_rejected_before_persistence() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let pipeline = heuristic_pipeline(store.clone());

        let err = pipeline
            .ingest(
                LETTER,
                IngestOptions {
                    manual_overrides: Some("{not json".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidInput(_)));

        let err = pipeline
            .ingest(
                LETTER,
                IngestOptions {
                    manual_overrides: Some(r#"{"sender": "not an object"}"#.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_overrides_win_over_extracted_fields() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        let person = Person::new("Johan".to_string(), "Smitt".to_string(), None);
        store.insert_person(&person).await.unwrap();

        let pipeline = heuristic_pipeline(store.clone());
        let report = pipeline
            .ingest(
                LETTER,
                IngestOptions {
                    manual_overrides: Some(
                        r#"{"recipient": {"first_name": "Johan", "last_name": "Smitt"}}"#
                            .to_string(),
                    ),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(report.recipient_person_id, Some(person.id));
        // The corrected name is what the parse record carries
        let parse = store.get_parse(report.parse_id).await.unwrap();
        assert_eq!(
            parse.parsed_recipient.get("first_name").map(String::as_str),
            Some("Johan")
        );
    }

    #[tokio::test]
    async fn test_quote_email_ingest_queues_both_slots() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let pipeline = heuristic_pipeline(store.clone());

        let email = "Hi Heather,\n\
            Please see the attached quote.\n\
            Thank you,\n\
            James Ostlie\n\
            (763) 200-4653\n\
            James.Ostlie@davey.com";

        let report = pipeline
            .ingest(email, IngestOptions::default())
            .await
            .unwrap();

        // Sender block carries a personal signature, not an organization
        // identity, and "Heather" alone cannot create a person: both slots
        // end up in review.
        assert_eq!(report.sender_location_id, None);
        assert_eq!(report.recipient_person_id, None);
        assert_eq!(report.pending_reviews.len(), 2);

        let parse = store.get_parse(report.parse_id).await.unwrap();
        assert!(parse.recipient_text.unwrap().contains("Heather"));
        assert!(parse.sender_text.unwrap().contains("James Ostlie"));
    }
}
