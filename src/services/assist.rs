//! Language-model assist client
//!
//! One client serves both optional assist calls: document segmentation and
//! structured field extraction. Calls are bounded by the configured timeout;
//! any failure is reported as an error for the caller to log and degrade on,
//! never to abort the pipeline.

use crate::config::AssistConfig;
use crate::error::{MailroomError, Result};
use crate::extractor::schema::FieldSchema;
use crate::types::BlockRole;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// How much document text an assist call sees at most
const MAX_PROMPT_CHARS: usize = 4000;

/// Assist client for segmentation and extraction
pub struct AssistClient {
    config: AssistConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    text: String,
}

/// Segmentation suggestion returned by the assist
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentSuggestion {
    pub sender_text: Option<String>,
    pub recipient_text: Option<String>,
    pub body_text: Option<String>,
    pub doc_type: Option<String>,
}

impl SegmentSuggestion {
    /// A suggestion is usable only if it identified at least one block
    pub fn is_usable(&self) -> bool {
        self.sender_text.is_some() || self.recipient_text.is_some()
    }
}

impl AssistClient {
    pub fn new(config: AssistConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = config.api_key();

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Ask the model to split raw document text into sender/recipient/body
    /// and label the document type.
    pub async fn segment(
        &self,
        raw_text: &str,
        filename_hint: Option<&str>,
    ) -> Result<SegmentSuggestion> {
        let excerpt: String = raw_text.chars().take(MAX_PROMPT_CHARS).collect();
        let hint = filename_hint
            .map(|h| format!("\nOriginal filename: {}\n", h))
            .unwrap_or_default();

        let prompt = format!(
            r#"Analyze the following document text and extract:

1. SENDER information (usually organization in top left corner or letterhead)
2. RECIPIENT information (usually person's name and address, may have "To:" or "Re:" prefix)
3. BODY text (main content of the document)
4. DOCUMENT TYPE (a short label such as "letter", "receipt", "quote")

Return a JSON object with these keys:
- "sender_text": The raw text block containing sender info (or null if not found)
- "recipient_text": The raw text block containing recipient info (or null if not found)
- "body_text": The main document content
- "doc_type": A short lowercase document-type label (or null)
{hint}
Document text:
{excerpt}

Return ONLY valid JSON, no explanation."#,
        );

        let response = self
            .call_api("You are a precise document parser. Return only valid JSON.", &prompt)
            .await?;
        let cleaned = strip_code_fences(&response);

        let suggestion: SegmentSuggestion = serde_json::from_str(cleaned)
            .map_err(|e| MailroomError::Assist(format!("Unparseable segmentation reply: {}", e)))?;

        debug!(
            sender = suggestion.sender_text.is_some(),
            recipient = suggestion.recipient_text.is_some(),
            doc_type = ?suggestion.doc_type,
            "assist segmentation reply"
        );

        Ok(suggestion)
    }

    /// Ask the model for a flat field mapping constrained to the given
    /// schema. Values are returned unvalidated; the extractor applies the
    /// hallucination guard before accepting any of them.
    pub async fn extract(
        &self,
        block_text: &str,
        role: BlockRole,
        schema: &FieldSchema,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let field_lines: Vec<String> = schema
            .fields
            .iter()
            .map(|f| format!("- \"{}\": string ({})", f.name, f.hint))
            .collect();

        let subject = match role {
            BlockRole::Sender => "sender/organization",
            BlockRole::Recipient => "recipient/person",
        };

        let prompt = format!(
            r#"Extract structured information from this {subject} text block.

CRITICAL RULES:
1. Only report values that appear in the text. Never invent data.
2. Return FLAT JSON - no nested objects.
3. Use null for fields not found.

Extract these fields (schema version {version}):
{fields}

Text:
{block}

Return ONLY valid JSON with NO nested objects."#,
            subject = subject,
            version = schema.version,
            fields = field_lines.join("\n"),
            block = block_text,
        );

        let response = self
            .call_api("You are a precise data extractor. Return only valid JSON.", &prompt)
            .await?;
        let cleaned = strip_code_fences(&response);

        let value: serde_json::Value = serde_json::from_str(cleaned)
            .map_err(|e| MailroomError::Assist(format!("Unparseable extraction reply: {}", e)))?;

        let mut map = match value {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(MailroomError::Assist(format!(
                    "Extraction reply is not an object: {}",
                    other
                )))
            }
        };

        // Absent fields are missing keys downstream, not nulls
        map.retain(|_, v| !v.is_null());

        debug!(role = role.as_str(), fields = map.len(), "assist extraction reply");

        Ok(map)
    }

    async fn call_api(&self, system: &str, prompt: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailroomError::Assist(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let body: AnthropicResponse = response.json().await?;

        body.content
            .first()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| MailroomError::Assist("Empty response content".to_string()))
    }
}

/// Remove markdown code fences around a JSON reply, if present
fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_suggestion_usability() {
        let empty = SegmentSuggestion::default();
        assert!(!empty.is_usable());

        let with_sender = SegmentSuggestion {
            sender_text: Some("Acme Corp".to_string()),
            ..Default::default()
        };
        assert!(with_sender.is_usable());
    }

    #[test]
    fn test_unavailable_without_key() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let client = AssistClient::new(AssistConfig::default()).unwrap();
        assert!(!client.is_available());
    }
}
