//! Verification code crate: sub-modules.

pub mod types;
pub mod config;
pub mod clock;
pub mod window;
pub mod deriver;
pub mod store;
pub mod lifecycle;
pub mod service;
#[cfg(feature = "commands")]
pub mod commands;

// Re-export top-level items for convenience.
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CodeConfig, EnrollmentRules, WindowPolicy};
pub use lifecycle::{CodeLifecycle, LifecycleState};
pub use service::{CodeService, CodeServiceState};
pub use store::{JsonFileProfileStore, MemoryProfileStore, ProfileStore};
#[cfg(feature = "commands")]
pub use commands::*;
