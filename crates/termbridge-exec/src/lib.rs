//! Command execution for the terminal bridge.
//!
//! Provides:
//! - `Classifier` - Built-in / blocked / dispatchable decisions
//! - `Launcher` - Host shell spawning with an augmented search path
//! - `pump` - Event-driven output pump with stdin relay
//! - `ProcessRegistry` - Live executions keyed by opaque id

pub mod classifier;
pub mod error;
pub mod launcher;
pub mod pump;
pub mod registry;
pub mod relay;
pub mod shell;
pub mod utf8;

pub use classifier::{BlockKind, Blocked, Builtin, Classification, Classifier, Dispatchable, Platform};
pub use error::ExecError;
pub use launcher::{LaunchedProcess, Launcher};
pub use pump::{PumpConfig, PumpOutcome, pump};
pub use registry::{ProcessRegistry, Registration};
pub use relay::{RelayClosed, RelayInput, RelayReceiver, RelaySender, relay_channel};
pub use shell::{HostShell, SearchPath, UnixShell, merge_paths};
