//! External service clients
//!
//! Currently one client: the optional language-model assist used by the
//! segmenter and the field extractor.

pub mod assist;

pub use assist::{AssistClient, SegmentSuggestion};
