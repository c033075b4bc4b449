//! Built-in action handlers.

mod log;
mod webhook;

pub use self::log::LogHandler;
pub use self::webhook::WebhookHandler;
