//! Serving recognized orders: model resolution, command assembly and the
//! external executor.
//!
//! ```text
//! MenuItem → ModelCache::resolve (hf-hub snapshot, memoized)
//!          → FulfillmentCommand (robot + cameras + dataset + policy)
//!          → FulfillmentExecutor::execute (lerobot-record)
//!          → DispatchOutcome
//! ```

pub mod cache;
pub mod command;
pub mod dispatch;
pub mod executor;

pub use cache::{ArtifactStore, HfHubStore, ModelCache, ResolveError, StoreError};
pub use command::{dataset_id, render_cameras, FulfillmentCommand};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use executor::{ExecutorError, FulfillmentExecutor, ProcessExecutor};

#[cfg(test)]
pub use cache::CountingStore;
#[cfg(test)]
pub use executor::RecordingExecutor;
