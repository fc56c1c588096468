//! Structured field extraction from text blocks
//!
//! Two layers: a regex layer that is always available, and an optional
//! language-model assist constrained to the role's field schema. Every
//! assist-suggested value is validated against the source block before
//! acceptance; unsupported values are dropped, never errors. Fields the
//! assist fails to produce are backfilled from the regex layer.

pub mod schema;

use crate::services::AssistClient;
use crate::types::{BlockRole, FieldMap};
use once_cell::sync::Lazy;
use regex::Regex;
use schema::{FieldSchema, GuardRule};
use std::sync::Arc;
use tracing::{debug, warn};

static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+\s+[\w\s]+(?:street|st|avenue|ave|road|rd|drive|dr|lane|ln|blvd|boulevard|way|court|ct|place|pl))[,\s]+([a-zA-Z\s]+)[,\s]+([A-Z]{2})\s+(\d{5}(?:-\d{4})?)",
    )
    .unwrap()
});

static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)$").unwrap());

/// Extracts a flat field mapping from a sender or recipient block
pub struct FieldExtractor {
    assist: Option<Arc<AssistClient>>,
}

impl FieldExtractor {
    pub fn new(assist: Option<Arc<AssistClient>>) -> Self {
        Self { assist }
    }

    /// Regex layer only, no assist
    pub fn regex_only() -> Self {
        Self { assist: None }
    }

    /// Extract typed fields from a block. Assist failures degrade to the
    /// regex layer; the result never contains a value the source block does
    /// not support, and absent fields are missing keys rather than nulls.
    pub async fn extract(&self, block_text: &str, role: BlockRole) -> FieldMap {
        let regex_fields = extract_regex(block_text);

        let assist_fields = match self.assist.as_deref().filter(|a| a.is_available()) {
            Some(assist) => {
                let schema = schema::schema_for(role);
                match assist.extract(block_text, role, schema).await {
                    Ok(raw) => accept_assist_fields(schema, &raw, block_text),
                    Err(e) => {
                        warn!(
                            role = role.as_str(),
                            "assist extraction failed, using regex layer only: {}", e
                        );
                        FieldMap::new()
                    }
                }
            }
            None => FieldMap::new(),
        };

        // Assist wins where it produced an accepted value; the regex layer
        // backfills everything else.
        let mut fields = regex_fields;
        for (key, value) in assist_fields {
            fields.insert(key, value);
        }

        debug!(role = role.as_str(), fields = fields.len(), "extraction complete");
        fields
    }
}

/// The regex layer: address, phone, email, and name patterns, with a
/// first-line organization fallback when no personal name is found.
pub fn extract_regex(text: &str) -> FieldMap {
    let mut data = FieldMap::new();

    if let Some(cap) = ADDRESS.captures(text) {
        data.insert("address".to_string(), cap[1].trim().to_string());
        data.insert("city".to_string(), cap[2].trim().to_string());
        data.insert("state".to_string(), cap[3].trim().to_string());
        data.insert("zip".to_string(), cap[4].trim().to_string());
    }

    if let Some(m) = PHONE.find(text) {
        data.insert("phone".to_string(), m.as_str().trim().to_string());
    }

    if let Some(m) = EMAIL.find(text) {
        data.insert("email".to_string(), m.as_str().to_string());
    }

    if let Some(cap) = NAME.captures(text) {
        let parts: Vec<&str> = cap[1].split_whitespace().collect();
        if parts.len() >= 2 {
            data.insert("first_name".to_string(), parts[0].to_string());
            data.insert("last_name".to_string(), parts[1..].join(" "));
        } else if parts.len() == 1 {
            data.insert("first_name".to_string(), parts[0].to_string());
        }
    }

    // No personal name: a digit-free first line is taken as the organization
    if !data.contains_key("first_name") {
        if let Some(first_line) = text.lines().next() {
            let first_line = first_line.trim();
            if !first_line.is_empty() && !first_line.chars().any(|c| c.is_ascii_digit()) {
                data.insert("organization_name".to_string(), first_line.to_string());
            }
        }
    }

    data
}

/// Hallucination guard: keep only assist values the source block supports,
/// under the guard rule the schema declares for each field.
pub fn accept_assist_fields(
    schema: &FieldSchema,
    raw: &serde_json::Map<String, serde_json::Value>,
    source: &str,
) -> FieldMap {
    let mut accepted = FieldMap::new();

    for (key, value) in raw {
        let Some(spec) = schema.field(key) else {
            debug!(field = %key, "assist field outside schema, dropped");
            continue;
        };

        let value = match value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => continue,
        };
        if value.is_empty() {
            continue;
        }

        if field_supported(&value, source, spec.guard) {
            accepted.insert(key.clone(), value);
        } else {
            debug!(field = %key, "assist value unsupported by source block, dropped");
        }
    }

    accepted
}

fn field_supported(value: &str, source: &str, rule: GuardRule) -> bool {
    match rule {
        GuardRule::Verbatim => source.contains(value),
        GuardRule::VerbatimNormalized => {
            strip_separators(source).contains(&strip_separators(value))
        }
        GuardRule::TokenOverlap => {
            let source_lower = source.to_lowercase();
            let tokens: Vec<String> = value
                .split_whitespace()
                .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
                .filter(|t| t.len() > 2)
                .collect();

            if tokens.is_empty() {
                // Short values (e.g. 2-letter states) must appear whole
                source_lower.contains(&value.to_lowercase())
            } else {
                tokens.iter().any(|t| source_lower.contains(t))
            }
        }
    }
}

fn strip_separators(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}
