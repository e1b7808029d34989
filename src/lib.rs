pub mod batch;
pub mod category;
pub mod coaching;
pub mod config;
pub mod criteria;
pub mod error;
pub mod ingest;
pub mod models;
pub mod report;
pub mod risk;
pub mod sla;
pub mod stats;
pub mod trend;

pub use batch::{run_batch, AgentFailure, AgentReport, BatchReport};
pub use config::EnginePolicy;
pub use error::{EngineError, EngineResult};
