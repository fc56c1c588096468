//! Mailroom - correspondence ingestion and entity resolution
//!
//! Ingests scanned or digital correspondence about individuals in care,
//! extracts structured sender/recipient data, and resolves it to canonical
//! person/organization records — automatically when confident, through a
//! human-adjudicated review queue when not.
//!
//! # Architecture
//!
//! - **Types**: canonical records (Person, Location), parse records, and the
//!   review-queue item
//! - **Segmenter / Extractor**: heuristic text segmentation and regex field
//!   extraction, each with an optional language-model assist layer
//! - **Resolver**: three-tier matching (deterministic → semantic → review)
//! - **Review**: the pending → resolved | skipped adjudication state machine
//! - **Storage**: SQLite-backed store behind a trait
//!
//! The assist and embedding backends are optional capabilities probed once
//! at startup; their absence degrades behavior per call site and never
//! prevents the pipeline from running.
//!
//! # Example
//!
//! ```ignore
//! use mailroom::{
//!     Capabilities, DocumentPipeline, IngestOptions, Settings, SqliteStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let capabilities = Capabilities::probe(&settings);
//!     let store = Arc::new(SqliteStore::open(settings.database_path())?);
//!
//!     let pipeline = DocumentPipeline::new(store, None, &settings, capabilities)?;
//!     let report = pipeline
//!         .ingest("Hi Heather,\n...", IngestOptions::default())
//!         .await?;
//!     println!("parse {} queued {} reviews", report.parse_id, report.pending_reviews.len());
//!     Ok(())
//! }
//! ```

pub mod capabilities;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod resolver;
pub mod review;
pub mod segmenter;
pub mod services;
pub mod source;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use capabilities::Capabilities;
pub use config::Settings;
pub use error::{MailroomError, Result};
pub use extractor::FieldExtractor;
pub use pipeline::{DocumentPipeline, IngestOptions, IngestReport};
pub use resolver::EntityResolver;
pub use review::{ReviewDetail, ReviewQueue};
pub use segmenter::{Segments, TextSegmenter};
pub use source::{PlainTextSource, TextSource};
pub use storage::{SqliteStore, Store};
pub use types::{
    BlockRole, EntityKind, FieldMap, Location, LocationId, ParseId, Person, PersonId, QueryKind,
    Resolution, ReviewDecision, ReviewId, ReviewQueueItem, ReviewStatus,
};
