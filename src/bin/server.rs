//! Clinic summarizer HTTP server.
//! Run with: cargo run --bin clinic-summarizer-server

use std::process::ExitCode;

use clinic_summarizer::start_summarizer;

fn main() -> ExitCode {
    start_summarizer::run()
}
