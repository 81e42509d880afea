pub mod config;
pub mod error;
pub mod db;
pub mod corpus;
pub mod cache;
pub mod graph;
pub mod recommender;
pub mod export;
pub mod server;

pub use config::Config;
pub use error::{RelsubsError, Result};
pub use corpus::{CommunityRecord, CorpusSource, SqliteCorpus};
pub use recommender::{GenerationFailure, GenerationOutcome, GraphRequest, Recommender, RecommenderSettings};
