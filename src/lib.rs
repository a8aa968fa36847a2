//! Nurse-patient conversation summarization service.
//!
//! A transcript goes to a local text-generation backend; the answer is parsed
//! into a fixed-shape clinical summary, either in one call or as an ordered
//! event stream (`metadata chunk* final complete`).

// Strict discipline: warnings are errors.
#![deny(warnings)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(dead_code)]
#![deny(non_camel_case_types)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(unused_must_use)]
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]
// Clippy; tests may unwrap and panic.
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::shadow_unrelated)]
#![deny(clippy::too_many_arguments)]
#![deny(clippy::cognitive_complexity)]
#![deny(overflowing_literals)]

/// Service configuration from the environment.
pub mod config;
/// Pipeline error taxonomy.
pub mod error;
/// Strongly typed identifiers.
pub mod ids;
/// Text-generation backends (Ollama, scripted).
pub mod llm;
/// Stream relay and its wire events.
pub mod relay;
/// HTTP server and API routes.
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::unused_async
)]
pub mod server;
/// Entry helpers to start the summarizer server.
pub mod start_summarizer;
/// Conversation record storage.
pub mod store;
/// Summarization: types, prompt, parser, summarizer.
#[allow(
    clippy::too_many_lines,
    clippy::cognitive_complexity,
    clippy::option_if_let_else
)]
pub mod summary;

pub use config::ServiceConfig;
pub use error::{SummarizeError, SummarizeResult};
pub use relay::{StreamEvent, StreamRelay};
pub use summary::{ConversationInput, StructuredSummary, Summarizer, SummaryReport};
