// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod format;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod quote;
pub mod scheduler;
pub mod seen;
pub mod shorten;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::format::{Digest, DigestStyle, Formatter};
pub use crate::ingest::types::{Item, Source, SourceProvider};
pub use crate::notify::{DispatchReport, Notifier, NotifierMux};
pub use crate::pipeline::{CycleReport, Pipeline};
pub use crate::scheduler::{Cadence, Job, JobAction, JobRunner, JobState, Scheduler};
pub use crate::seen::{FileSeenStore, MemorySeenStore, SeenStore};
