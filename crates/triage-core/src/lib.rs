pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod gitlab;
pub mod policy;
pub mod report;
pub mod rules;
pub mod run;
pub mod snapshot;
pub mod templates;
pub mod tracker;
pub mod types;

pub use error::{Result, TriageError};
