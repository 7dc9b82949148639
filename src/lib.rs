pub mod config;
pub mod error;
pub mod db;
pub mod lexicon;
pub mod embeddings;
pub mod graph;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{LexigraphError, Result};
pub use pipeline::{DiscoveryReport, Pipeline, RunSummary};
