//! Session orchestration and storage for the terminal bridge.
//!
//! Provides:
//! - `SessionManager` - exec / stdin / interrupt entry points
//! - `cwd` - the per-session working directory state machine
//! - Storage implementations (memory)

pub mod cwd;
pub mod manager;
pub mod storage;

pub use manager::{ExecStream, ManagerError, PromptInfo, SessionManager};
