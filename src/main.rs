//! Mailroom CLI
//!
//! Ingests correspondence files and drives the manual review queue from the
//! command line.

use clap::{Parser, Subcommand};
use mailroom::{
    embeddings, Capabilities, DocumentPipeline, EntityKind, IngestOptions, MailroomError,
    PlainTextSource, ReviewDecision, ReviewId, ReviewQueue, Settings, SqliteStore, TextSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailroom", version, about = "Correspondence ingestion and entity resolution")]
struct Cli {
    /// Database file path (defaults to MAILROOM_DB_PATH or the platform data dir)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Settings file path
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a plain-text correspondence file
    Ingest {
        /// Path to the document text file
        file: PathBuf,

        /// Document type label (falls back to the segmenter's hint)
        #[arg(long)]
        doc_type: Option<String>,

        /// Manual override JSON: {"sender": {...}, "recipient": {...}}
        #[arg(long)]
        manual_data: Option<String>,
    },

    /// Manage the manual review queue
    Review {
        #[command(subcommand)]
        command: ReviewCommand,
    },
}

#[derive(Subcommand)]
enum ReviewCommand {
    /// List pending review items
    List {
        /// Filter by entity kind: person or location
        #[arg(long, value_parser = parse_kind)]
        kind: Option<EntityKind>,
    },

    /// Show one review item with its document context
    Show { id: String },

    /// Resolve a pending item by picking an entity, creating one, or skipping
    Resolve {
        id: String,

        /// Reviewer identity recorded on the item
        #[arg(long)]
        reviewer: String,

        /// Existing entity id to link
        #[arg(long, conflicts_with_all = ["create", "skip"])]
        pick: Option<String>,

        /// JSON field map for a new entity of the item's kind
        #[arg(long, conflicts_with = "skip")]
        create: Option<String>,

        /// Close the item without recording an entity
        #[arg(long)]
        skip: bool,
    },

    /// Queue counts by status, entity kind, and query kind
    Stats,

    /// Delete a review item (admin)
    Delete { id: String },
}

fn parse_kind(s: &str) -> Result<EntityKind, String> {
    EntityKind::from_str_opt(s).ok_or_else(|| format!("unknown entity kind: {}", s))
}

fn parse_review_id(s: &str) -> anyhow::Result<ReviewId> {
    Ok(ReviewId::from_string(s)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.database_path = Some(db);
    }

    let store = Arc::new(SqliteStore::open(settings.database_path())?);

    match cli.command {
        Command::Ingest {
            file,
            doc_type,
            manual_data,
        } => {
            let capabilities = Capabilities::probe(&settings);

            let embedder = if capabilities.embeddings {
                match embeddings::from_config(&settings.embedding).await {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        warn!("embedding backend unavailable, semantic tier disabled: {}", e);
                        None
                    }
                }
            } else {
                None
            };

            let source = PlainTextSource.fetch(&file)?;
            let pipeline = DocumentPipeline::new(store, embedder, &settings, capabilities)?;

            let report = pipeline
                .ingest(
                    &source.text,
                    IngestOptions {
                        doc_type,
                        source_file: file.file_name().map(|n| n.to_string_lossy().into_owned()),
                        manual_overrides: manual_data,
                    },
                )
                .await?;

            println!("Parse:     {}", report.parse_id);
            if let Some(doc_type) = &report.doc_type {
                println!("Type:      {}", doc_type);
            }
            match report.sender_location_id {
                Some(id) => println!("Sender:    location {}", id),
                None => println!("Sender:    unresolved"),
            }
            match report.recipient_person_id {
                Some(id) => println!("Recipient: person {}", id),
                None => println!("Recipient: unresolved"),
            }
            for review_id in &report.pending_reviews {
                println!("Queued:    review {}", review_id);
            }
            println!("Body:      {}", report.body_preview);
        }

        Command::Review { command } => {
            let queue = ReviewQueue::new(store);
            run_review_command(&queue, command).await?;
        }
    }

    Ok(())
}

async fn run_review_command(queue: &ReviewQueue, command: ReviewCommand) -> anyhow::Result<()> {
    match command {
        ReviewCommand::List { kind } => {
            let items = queue.list_pending(kind).await?;
            if items.is_empty() {
                println!("No pending review items");
                return Ok(());
            }
            for item in &items {
                println!(
                    "{}  {:<8}  {:<16}  {} candidate(s)",
                    item.id,
                    item.entity_kind,
                    item.query_kind.as_str(),
                    item.candidates.len()
                );
            }
            println!("{} pending", items.len());
        }

        ReviewCommand::Show { id } => {
            let detail = queue.get(parse_review_id(&id)?).await?;
            let item = &detail.item;

            println!("Review:  {}", item.id);
            println!("Status:  {}", item.status.as_str());
            println!("Kind:    {} ({})", item.entity_kind, item.query_kind.as_str());
            println!("Fields:  {}", serde_json::to_string_pretty(&item.fields)?);
            for candidate in &item.candidates {
                println!(
                    "  candidate {} ({:.3}): {}",
                    candidate.entity_id,
                    candidate.similarity,
                    serde_json::to_string(&candidate.display)?
                );
            }
            println!("Parse:   {}", detail.document.parse_id);
            if let Some(text) = &detail.document.sender_text {
                println!("--- sender block ---\n{}", text);
            }
            if let Some(text) = &detail.document.recipient_text {
                println!("--- recipient block ---\n{}", text);
            }
        }

        ReviewCommand::Resolve {
            id,
            reviewer,
            pick,
            create,
            skip,
        } => {
            let decision = match (pick, create, skip) {
                (Some(entity_id), None, false) => ReviewDecision::Pick {
                    entity_id: uuid::Uuid::parse_str(&entity_id)?,
                },
                (None, Some(fields), false) => ReviewDecision::Create {
                    fields: serde_json::from_str(&fields).map_err(|e| {
                        MailroomError::InvalidInput(format!("malformed --create JSON: {}", e))
                    })?,
                },
                (None, None, true) => ReviewDecision::Skip,
                _ => {
                    return Err(MailroomError::InvalidInput(
                        "pass exactly one of --pick, --create, --skip".to_string(),
                    )
                    .into())
                }
            };

            match queue.resolve(parse_review_id(&id)?, decision, &reviewer).await? {
                Some(entity_id) => println!("Resolved to entity {}", entity_id),
                None => println!("Skipped"),
            }
        }

        ReviewCommand::Stats => {
            let stats = queue.stats().await?;
            println!("Pending:   {}", stats.total_pending);
            println!("Resolved:  {}", stats.total_resolved);
            println!("Skipped:   {}", stats.total_skipped);
            println!(
                "By kind:   person={} location={}",
                stats.pending_persons, stats.pending_locations
            );
            println!(
                "By query:  no_results={} multiple_results={}",
                stats.pending_no_results, stats.pending_multiple_results
            );
        }

        ReviewCommand::Delete { id } => {
            queue.delete(parse_review_id(&id)?).await?;
            println!("Deleted review {}", id);
        }
    }

    Ok(())
}
