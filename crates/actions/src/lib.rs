//! Action execution for matched rules.
//!
//! This crate provides:
//! - `ActionHandler` trait for pluggable side-effecting handlers
//! - A registry mapping each action type to its handler
//! - An idempotency dispatch log keyed by `(event, type, config)`, in memory
//!   or written through to a JSON file
//! - The `ActionDispatcher` that isolates handler failures per action
//! - Built-in tracing log and HTTP webhook handlers

pub mod dispatch_log;
pub mod dispatcher;
pub mod handlers;
pub mod registry;
pub mod traits;

pub use dispatch_log::{
    idempotency_key, DispatchLog, DispatchLogError, DispatchStore, JsonFileDispatchStore,
};
pub use dispatcher::{ActionDispatcher, DispatchOutcome, FailureReason};
pub use handlers::{LogHandler, WebhookHandler};
pub use registry::HandlerRegistry;
pub use traits::{ActionContext, ActionHandler, HandlerError};
