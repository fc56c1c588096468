//! Document text segmentation
//!
//! Splits raw correspondence text into sender/recipient/body blocks using
//! layout heuristics, with an optional language-model assist that is
//! accepted wholesale only when it identifies at least one block. The
//! segmenter is stateless across calls.
//!
//! Heuristic precedence: quote/email style, letter style, receipt style,
//! then a positional default.

use crate::services::AssistClient;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lines scanned for a salutation when detecting quote/email style
const SALUTATION_SCAN_LINES: usize = 20;

/// Forward window searched for a signature marker after a salutation
const SIGNATURE_SCAN_LINES: usize = 50;

/// Fallback offset above the signature marker when no closing phrase is found
const SIGNATURE_FALLBACK_OFFSET: usize = 2;

/// Lines scanned for a receipt header
const RECEIPT_SCAN_LINES: usize = 30;

static SALUTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Hi|Hello|Hey)\s+([A-Za-z]+)\s*,").unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap());

const CLOSING_PHRASES: [&str; 4] = ["thank you", "sincerely", "best", "regards"];

const RECEIPT_HEADERS: [&str; 2] = ["payer information", "recipient information"];

const RECEIPT_SECTION_BREAKS: [&str; 3] = ["account information", "transaction", "summary"];

/// Segmentation output: identified blocks plus an optional document-type
/// label from the assist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segments {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub body: String,
    pub doc_type_hint: Option<String>,
}

/// Splits raw document text into sender, recipient, and body blocks
pub struct TextSegmenter {
    assist: Option<Arc<AssistClient>>,
}

impl TextSegmenter {
    pub fn new(assist: Option<Arc<AssistClient>>) -> Self {
        Self { assist }
    }

    /// Heuristics only, no assist
    pub fn heuristic_only() -> Self {
        Self { assist: None }
    }

    /// Segment a document. The assist is tried first when present; its
    /// output is accepted wholesale only if it reports at least one of
    /// sender/recipient. Otherwise the heuristic path runs, preserving the
    /// assist's document-type label if it produced one.
    pub async fn segment(&self, raw_text: &str, filename_hint: Option<&str>) -> Segments {
        let mut doc_type_hint = None;

        if let Some(assist) = self.assist.as_deref().filter(|a| a.is_available()) {
            match assist.segment(raw_text, filename_hint).await {
                Ok(suggestion) => {
                    if suggestion.is_usable() {
                        debug!("assist segmentation accepted");
                        return Segments {
                            sender: suggestion.sender_text,
                            recipient: suggestion.recipient_text,
                            body: suggestion
                                .body_text
                                .unwrap_or_else(|| raw_text.to_string()),
                            doc_type_hint: suggestion.doc_type,
                        };
                    }
                    debug!("assist segmentation unusable, falling back to heuristics");
                    doc_type_hint = suggestion.doc_type;
                }
                Err(e) => {
                    warn!("assist segmentation failed, falling back to heuristics: {}", e);
                }
            }
        }

        let mut segments = Self::segment_heuristic(raw_text);
        if segments.doc_type_hint.is_none() {
            segments.doc_type_hint = doc_type_hint;
        }
        segments
    }

    /// The heuristic path, exposed for direct use and testing
    pub fn segment_heuristic(raw_text: &str) -> Segments {
        let lines: Vec<&str> = raw_text.trim().lines().collect();

        quote_style(&lines)
            .or_else(|| letter_style(&lines))
            .or_else(|| receipt_style(&lines))
            .unwrap_or_else(|| default_style(&lines))
    }
}

fn is_signature_marker(line: &str) -> bool {
    EMAIL.is_match(line) || PHONE.is_match(line)
}

fn is_closing_phrase(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    CLOSING_PHRASES.iter().any(|p| lower.starts_with(p))
}

fn join(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

/// Email/quote style: a salutation line near the top names the recipient;
/// the sender block is recovered from the signature at the bottom.
fn quote_style(lines: &[&str]) -> Option<Segments> {
    let salutation_at = lines
        .iter()
        .take(SALUTATION_SCAN_LINES)
        .position(|line| SALUTATION.is_match(line.trim()))?;

    let recipient = SALUTATION
        .captures(lines[salutation_at].trim())
        .map(|cap| cap[1].to_string())?;

    // Signature marker: first email- or phone-shaped line after the
    // salutation, extended over any directly following marker lines.
    let scan_end = (salutation_at + 1 + SIGNATURE_SCAN_LINES).min(lines.len());
    let marker = lines[salutation_at + 1..scan_end]
        .iter()
        .position(|line| is_signature_marker(line))
        .map(|offset| salutation_at + 1 + offset);

    let Some(marker) = marker else {
        // Salutation without a discoverable signature: recipient only.
        return Some(Segments {
            sender: None,
            recipient: Some(recipient),
            body: join(&lines[salutation_at + 1..]),
            doc_type_hint: None,
        });
    };

    let mut signature_end = marker;
    while signature_end + 1 < lines.len() && is_signature_marker(lines[signature_end + 1]) {
        signature_end += 1;
    }

    // Walk backward to the nearest closing phrase, or a fixed offset above
    // the marker when none is found.
    let sender_start = (salutation_at + 1..marker)
        .rev()
        .find(|&i| is_closing_phrase(lines[i]))
        .unwrap_or_else(|| {
            marker
                .saturating_sub(SIGNATURE_FALLBACK_OFFSET)
                .max(salutation_at + 1)
        });

    let mut body_lines: Vec<&str> = lines[salutation_at + 1..sender_start].to_vec();
    body_lines.extend_from_slice(&lines[signature_end + 1..]);

    Some(Segments {
        sender: Some(join(&lines[sender_start..=signature_end])),
        recipient: Some(recipient),
        body: join(&body_lines),
        doc_type_hint: None,
    })
}

/// Letter style: a "Dear " salutation; the non-empty block preceding it is
/// the recipient address, everything above that is letterhead (sender).
fn letter_style(lines: &[&str]) -> Option<Segments> {
    let dear_lines: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim_start().starts_with("Dear "))
        .map(|(i, _)| i)
        .collect();

    // Prefer a "Dear" line punctuated like a salutation; an address block
    // can itself begin with "Dear <name>" and must not be mistaken for one.
    let dear_at = dear_lines
        .iter()
        .copied()
        .find(|&i| {
            let trimmed = lines[i].trim_end();
            trimmed.ends_with(',') || trimmed.ends_with(':')
        })
        .or_else(|| dear_lines.first().copied())?;

    let mut block_end = dear_at;
    while block_end > 0 && lines[block_end - 1].trim().is_empty() {
        block_end -= 1;
    }
    let mut block_start = block_end;
    while block_start > 0 && !lines[block_start - 1].trim().is_empty() {
        block_start -= 1;
    }

    let recipient = (block_start < block_end).then(|| join(&lines[block_start..block_end]));
    let sender_text = join(&lines[..block_start]);

    Some(Segments {
        sender: (!sender_text.is_empty()).then_some(sender_text),
        recipient,
        body: join(&lines[dear_at..]),
        doc_type_hint: None,
    })
}

/// Receipt style: a "payer information"/"recipient information" header
/// followed by the addressee block. Receipts carry no sender by convention.
fn receipt_style(lines: &[&str]) -> Option<Segments> {
    let header_at = lines
        .iter()
        .take(RECEIPT_SCAN_LINES)
        .position(|line| {
            let lower = line.to_lowercase();
            RECEIPT_HEADERS.iter().any(|h| lower.contains(h))
        })?;

    let mut block_start = header_at + 1;
    while block_start < lines.len() && lines[block_start].trim().is_empty() {
        block_start += 1;
    }

    let mut block_end = block_start;
    while block_end < lines.len() {
        let line = lines[block_end].trim();
        if line.is_empty() {
            break;
        }
        let lower = line.to_lowercase();
        if RECEIPT_SECTION_BREAKS.iter().any(|b| lower.contains(b)) {
            break;
        }
        block_end += 1;
    }

    if block_start == block_end {
        return None;
    }

    let mut body_lines: Vec<&str> = lines[..header_at].to_vec();
    body_lines.extend_from_slice(&lines[block_end..]);

    Some(Segments {
        sender: None,
        recipient: Some(join(&lines[block_start..block_end])),
        body: join(&body_lines),
        doc_type_hint: None,
    })
}

/// Positional default: the first few non-empty lines are treated as the
/// sender (letterhead corner); a "To:"/"Re:" indicator marks the recipient.
fn default_style(lines: &[&str]) -> Segments {
    let mut sender = None;
    let mut body_start = 0;

    let mut first_block = Vec::new();
    for (i, line) in lines.iter().take(15).enumerate() {
        let line = line.trim();
        if !line.is_empty() {
            first_block.push(line);
            if first_block.len() >= 5 {
                sender = Some(first_block.join("\n"));
                body_start = i + 1;
                break;
            }
        }
    }

    let mut recipient = None;
    let remaining = &lines[body_start.min(lines.len())..];
    let mut recipient_block = Vec::new();
    let mut found_indicator = false;

    for (i, line) in remaining.iter().take(20).enumerate() {
        let line = line.trim();
        let lower = line.to_lowercase();
        if !found_indicator && (lower.contains("to:") || lower.contains("re:")) {
            found_indicator = true;
            continue;
        }

        if found_indicator && !line.is_empty() {
            recipient_block.push(line);
            if recipient_block.len() >= 4 {
                recipient = Some(recipient_block.join("\n"));
                body_start += i + 1;
                break;
            }
        }
    }

    Segments {
        sender,
        recipient,
        body: join(&lines[body_start.min(lines.len())..]),
        doc_type_hint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_style_email() {
        let text = "Hi Heather,\n\
            Please see the attached quote for the oak removal.\n\
            Let me know if you have questions.\n\
            Thank you,\n\
            James Ostlie\n\
            (763) 200-4653\n\
            James.Ostlie@davey.com";

        let segments = TextSegmenter::segment_heuristic(text);

        assert_eq!(segments.recipient.as_deref(), Some("Heather"));
        let sender = segments.sender.unwrap();
        assert!(sender.contains("James Ostlie"));
        assert!(sender.contains("(763) 200-4653"));
        assert!(sender.contains("James.Ostlie@davey.com"));
        assert!(segments.body.contains("attached quote"));
        assert!(!segments.body.contains("James Ostlie"));
    }

    #[test]
    fn test_quote_style_without_closing_phrase_uses_fallback_offset() {
        let text = "Hello Marcus,\n\
            The invoice is past due.\n\
            Another body line here.\n\
            Yet another line.\n\
            Dana Whitfield\n\
            dana@northpoint.org";

        let segments = TextSegmenter::segment_heuristic(text);

        assert_eq!(segments.recipient.as_deref(), Some("Marcus"));
        let sender = segments.sender.unwrap();
        assert!(sender.contains("Dana Whitfield"));
        assert!(sender.contains("dana@northpoint.org"));
    }

    #[test]
    fn test_quote_style_salutation_only() {
        let text = "Hey Priya,\nquick note with no signature at all";
        let segments = TextSegmenter::segment_heuristic(text);

        assert_eq!(segments.recipient.as_deref(), Some("Priya"));
        assert_eq!(segments.sender, None);
        assert!(segments.body.contains("quick note"));
    }

    #[test]
    fn test_letter_style_with_letterhead() {
        let text = "Minnesota Department of Human Services\n\
            Legislative Mailing\n\
            PO Box 64989\n\
            St. Paul, MN 55164\n\
            www.dhs.state.mn.us\n\
            \n\
            Dear John Smith\n\
            123 Oak St\n\
            City, ST 00000\n\
            \n\
            Dear John,\n\
            Your benefits renewal is enclosed.";

        let segments = TextSegmenter::segment_heuristic(text);

        let sender = segments.sender.unwrap();
        assert!(sender.contains("Minnesota Department of Human Services"));
        assert!(sender.contains("PO Box 64989"));
        assert!(sender.contains("www.dhs.state.mn.us"));

        let recipient = segments.recipient.unwrap();
        assert!(recipient.contains("Dear John Smith"));
        assert!(recipient.contains("123 Oak St"));
        assert!(recipient.contains("City, ST 00000"));

        assert!(segments.body.starts_with("Dear John,"));
    }

    #[test]
    fn test_receipt_style_has_no_sender() {
        let text = "RECEIPT #4452\n\
            \n\
            Payer Information\n\
            John Smith\n\
            123 Oak St\n\
            City, ST 00000\n\
            \n\
            Transaction Summary\n\
            Total: $42.00";

        let segments = TextSegmenter::segment_heuristic(text);

        assert_eq!(segments.sender, None);
        let recipient = segments.recipient.unwrap();
        assert!(recipient.contains("John Smith"));
        assert!(recipient.contains("123 Oak St"));
        assert!(segments.body.contains("RECEIPT #4452"));
        assert!(segments.body.contains("Total: $42.00"));
    }

    #[test]
    fn test_default_style_with_to_indicator() {
        let text = "Northpoint Clinic\n\
            450 Elm Ave\n\
            Suite 200\n\
            Fargo, ND 58102\n\
            billing department\n\
            To:\n\
            Sarah Connor\n\
            1 Skynet Way\n\
            Los Angeles, CA 90001\n\
            Attn Records Dept\n\
            \n\
            This letter confirms your appointment.";

        let segments = TextSegmenter::segment_heuristic(text);

        let sender = segments.sender.unwrap();
        assert!(sender.contains("Northpoint Clinic"));
        assert!(sender.contains("billing department"));

        let recipient = segments.recipient.unwrap();
        assert!(recipient.contains("Sarah Connor"));
        assert!(recipient.contains("1 Skynet Way"));
        assert!(!recipient.contains("This letter confirms"));

        assert_eq!(segments.body, "This letter confirms your appointment.");
    }

    #[test]
    fn test_empty_input() {
        let segments = TextSegmenter::segment_heuristic("");
        assert_eq!(segments.sender, None);
        assert_eq!(segments.recipient, None);
        assert_eq!(segments.body, "");
        assert_eq!(segments.doc_type_hint, None);
    }
}
