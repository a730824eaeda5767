pub mod cli;
pub mod config;
pub mod error;
pub mod etl;
pub mod store;
pub mod telemetry;

pub mod prelude {
    pub use crate::error::{Error, Result};

    pub use crate::etl::job::{JobSettings, Orchestrator, RunResult, RunStatus, Step};
    pub use crate::etl::types::{EntityKind, SourceEntity, TargetEntity};
}
