//! # skillgate-store
//!
//! SQLite persistence for admitted jobs.
//!
//! [`SqliteJobStore`] implements the kernel's `JobStore` seam so queued and
//! running jobs survive a process restart:
//!
//! ```rust,ignore
//! let pool = skillgate_store::connect("sqlite://skillgate.db").await?;
//! let kernel = ExecutionKernel::new(config, policy, validator, audit)
//!     .with_job_store(Arc::new(SqliteJobStore::new(pool)));
//! ```

pub mod connection;
pub mod error;
pub mod jobs;

pub use connection::{connect, connect_with_settings, DbPool};
pub use error::StoreError;
pub use jobs::{SqliteJobStore, StoredJobRecord, StoredState};
