//! Shared data model for the post-interaction automation engine.
//!
//! - [`InteractionEvent`] and the [`ConditionField`] enumeration with legal value sets
//! - [`Rule`] / [`RuleDraft`] with their [`Condition`]s and typed [`Action`]s
//! - Environment-driven [`Config`]

pub mod action;
pub mod config;
pub mod event;
pub mod rule;

pub use action::*;
pub use config::{load_dotenv, AuditConfig, Config, EngineConfig, RulesConfig, WebhookConfig};
pub use event::*;
pub use rule::*;
