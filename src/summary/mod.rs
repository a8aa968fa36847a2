//! Conversation summarization.
//!
//! - [`types`]: transcript input, the structured summary and its metadata.
//! - [`prompt`]: instructions sent to the model.
//! - [`parser`]: forgiving extraction of the summary from model text.
//! - [`summarizer`]: single-shot and streaming summarization.

pub mod lenient;
pub mod parser;
pub mod prompt;
pub mod summarizer;
pub mod types;

pub use parser::{OutputParser, ParsedOutput};
pub use prompt::{SAMPLE_CONVERSATION, build_prompt};
pub use summarizer::{Summarizer, SummaryStream};
pub use types::{
    ConversationInput, MedicalHistory, ParseStrategy, ProcessingMetadata, StructuredSummary,
    SummaryReport, Symptoms,
};
