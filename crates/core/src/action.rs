//! Typed action definitions.
//!
//! Each action type carries its own config struct. On the wire an action
//! looks like `{ "type": "add_tag", "config": { "tag": "vip" } }`. The
//! `config` object must be present but every field in it is optional;
//! handlers decide what they require.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed enumeration of action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTask,
    SendEmail,
    UpdateCrm,
    CreateTicket,
    NotifyManager,
    ScheduleFollowup,
    AddTag,
    TriggerWorkflow,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::CreateTask,
        ActionType::SendEmail,
        ActionType::UpdateCrm,
        ActionType::CreateTicket,
        ActionType::NotifyManager,
        ActionType::ScheduleFollowup,
        ActionType::AddTag,
        ActionType::TriggerWorkflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateTask => "create_task",
            ActionType::SendEmail => "send_email",
            ActionType::UpdateCrm => "update_crm",
            ActionType::CreateTicket => "create_ticket",
            ActionType::NotifyManager => "notify_manager",
            ActionType::ScheduleFollowup => "schedule_followup",
            ActionType::AddTag => "add_tag",
            ActionType::TriggerWorkflow => "trigger_workflow",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown action type: '{s}'"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTaskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_in_hours: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SendEmailConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateCrmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTicketConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyManagerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleFollowupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AddTagConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerWorkflowConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Overrides the handler's default endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// An action to perform when a rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum Action {
    CreateTask(CreateTaskConfig),
    SendEmail(SendEmailConfig),
    UpdateCrm(UpdateCrmConfig),
    CreateTicket(CreateTicketConfig),
    NotifyManager(NotifyManagerConfig),
    ScheduleFollowup(ScheduleFollowupConfig),
    AddTag(AddTagConfig),
    TriggerWorkflow(TriggerWorkflowConfig),
}

impl Action {
    pub fn kind(&self) -> ActionType {
        match self {
            Action::CreateTask(_) => ActionType::CreateTask,
            Action::SendEmail(_) => ActionType::SendEmail,
            Action::UpdateCrm(_) => ActionType::UpdateCrm,
            Action::CreateTicket(_) => ActionType::CreateTicket,
            Action::NotifyManager(_) => ActionType::NotifyManager,
            Action::ScheduleFollowup(_) => ActionType::ScheduleFollowup,
            Action::AddTag(_) => ActionType::AddTag,
            Action::TriggerWorkflow(_) => ActionType::TriggerWorkflow,
        }
    }

    /// Canonical JSON of the config payload alone.
    ///
    /// Unset fields are omitted, so equal configs always produce equal strings.
    pub fn canonical_config(&self) -> String {
        let value = match self {
            Action::CreateTask(c) => serde_json::to_value(c),
            Action::SendEmail(c) => serde_json::to_value(c),
            Action::UpdateCrm(c) => serde_json::to_value(c),
            Action::CreateTicket(c) => serde_json::to_value(c),
            Action::NotifyManager(c) => serde_json::to_value(c),
            Action::ScheduleFollowup(c) => serde_json::to_value(c),
            Action::AddTag(c) => serde_json::to_value(c),
            Action::TriggerWorkflow(c) => serde_json::to_value(c),
        };
        // Config structs hold only strings and integers.
        value.map(|v| v.to_string()).unwrap_or_default()
    }
}
