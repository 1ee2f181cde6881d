//! Size- and age-bounded batching with bounded in-flight delivery.

pub mod accumulator;
pub mod admission;
mod cancel;
mod error;
pub mod executor;
mod link;
mod options;
mod stage;
mod stats;
mod timer;

pub use accumulator::{Accumulator, CloseReason, Offer};
pub use admission::{AdmissionController, Permit};
pub use cancel::CancelToken;
pub use error::{ExecuteError, StageError};
pub use executor::{Executor, Task, WorkerPool};
pub use link::{FnTarget, Target};
pub use options::BatchOptions;
pub use stage::{BatchStage, StageState};
pub use stats::{StageStats, StatsSnapshot};
