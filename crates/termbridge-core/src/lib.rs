//! Core abstractions for the terminal bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `OutputMessage` - NDJSON line streamed back for a command
//! - `WorkspaceContext` - Opaque request context
//! - `Authenticator` / `WorkspaceResolver` - External collaborators
//! - `SessionStore` - Session persistence trait
//! - `BridgeConfig` - Shared tunables

pub mod auth;
pub mod config;
pub mod context;
pub mod message;
pub mod traits;
pub mod workspace;

pub use auth::{Authenticator, Credentials, StaticTokenAuthenticator, User};
pub use config::{BridgeConfig, ConfigError, DisconnectPolicy};
pub use context::WorkspaceContext;
pub use message::{ExecutionId, Meta, OutputMessage};
pub use traits::{Session, SessionStore, StoreError, UserId, unix_now};
pub use workspace::{DirectoryWorkspaces, NoWorkspaces, WorkspaceResolver};
