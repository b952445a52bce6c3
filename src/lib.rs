// Library surface shared by the `questlog` binary and integration tests.
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod leveling;
pub mod runtime;
pub mod session;
pub mod util;

pub use error::{ConfigError, TimestampError};
pub use leveling::{compute_level_info, LevelInfo};
pub use session::{elapsed_snapshot, SessionSnapshot, SessionTimer, TimezonePolicy};
