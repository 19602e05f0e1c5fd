pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod parser;
pub mod patterns;
pub mod report;
pub mod scheduler;

pub use engine::{ParseEngine, ScanMessage, ScanOutcome, ScanState};
pub use error::{LogSpamError, Result};
pub use scheduler::{latest_message, ScanScheduler};
