use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event field a [`Condition`](crate::Condition) can test.
///
/// Deserializes from any string: names outside the fixed enumeration land in
/// [`ConditionField::Unknown`] so a rule carrying one still loads, but the
/// condition never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionField {
    Sentiment,
    Outcome,
    QueryType,
    CustomerTier,
    ChurnRisk,
    PurchaseIntent,
    Channel,
    Duration,
    Unknown(String),
}

/// Wire names of the recognized condition fields.
pub const FIELD_NAMES: &[&str] = &[
    "sentiment",
    "outcome",
    "query_type",
    "customer_tier",
    "churn_risk",
    "purchase_intent",
    "channel",
    "duration",
];

pub const SENTIMENT_VALUES: &[&str] = &["positive", "negative", "neutral", "mixed"];
pub const OUTCOME_VALUES: &[&str] = &[
    "resolved",
    "unresolved",
    "escalated",
    "transferred",
    "abandoned",
    "sale_completed",
];
pub const QUERY_TYPE_VALUES: &[&str] = &[
    "billing",
    "technical",
    "sales",
    "complaint",
    "account",
    "cancellation",
    "general",
];
pub const CUSTOMER_TIER_VALUES: &[&str] = &["vip", "premium", "standard", "basic"];
pub const CHURN_RISK_VALUES: &[&str] = &["high", "medium", "low"];
pub const PURCHASE_INTENT_VALUES: &[&str] = &["high", "medium", "low", "none"];
pub const CHANNEL_VALUES: &[&str] = &["voice", "chat", "email", "sms", "social"];

impl ConditionField {
    /// All recognized fields, in declaration order.
    pub const KNOWN: [ConditionField; 8] = [
        ConditionField::Sentiment,
        ConditionField::Outcome,
        ConditionField::QueryType,
        ConditionField::CustomerTier,
        ConditionField::ChurnRisk,
        ConditionField::PurchaseIntent,
        ConditionField::Channel,
        ConditionField::Duration,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ConditionField::Sentiment => "sentiment",
            ConditionField::Outcome => "outcome",
            ConditionField::QueryType => "query_type",
            ConditionField::CustomerTier => "customer_tier",
            ConditionField::ChurnRisk => "churn_risk",
            ConditionField::PurchaseIntent => "purchase_intent",
            ConditionField::Channel => "channel",
            ConditionField::Duration => "duration",
            ConditionField::Unknown(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ConditionField::Unknown(_))
    }

    /// Legal values for `equals` / `not_equals`.
    ///
    /// Returns `None` for `duration` (any non-negative integer number of
    /// seconds) and for unknown fields.
    pub fn legal_values(&self) -> Option<&'static [&'static str]> {
        match self {
            ConditionField::Sentiment => Some(SENTIMENT_VALUES),
            ConditionField::Outcome => Some(OUTCOME_VALUES),
            ConditionField::QueryType => Some(QUERY_TYPE_VALUES),
            ConditionField::CustomerTier => Some(CUSTOMER_TIER_VALUES),
            ConditionField::ChurnRisk => Some(CHURN_RISK_VALUES),
            ConditionField::PurchaseIntent => Some(PURCHASE_INTENT_VALUES),
            ConditionField::Channel => Some(CHANNEL_VALUES),
            ConditionField::Duration | ConditionField::Unknown(_) => None,
        }
    }
}

impl From<String> for ConditionField {
    fn from(s: String) -> Self {
        match s.as_str() {
            "sentiment" => ConditionField::Sentiment,
            "outcome" => ConditionField::Outcome,
            "query_type" => ConditionField::QueryType,
            "customer_tier" => ConditionField::CustomerTier,
            "churn_risk" => ConditionField::ChurnRisk,
            "purchase_intent" => ConditionField::PurchaseIntent,
            "channel" => ConditionField::Channel,
            "duration" => ConditionField::Duration,
            _ => ConditionField::Unknown(s),
        }
    }
}

impl From<ConditionField> for String {
    fn from(field: ConditionField) -> Self {
        match field {
            ConditionField::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for ConditionField {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ConditionField::from(s.to_string()))
    }
}

impl fmt::Display for ConditionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed customer interaction (call, chat, email) to evaluate rules against.
///
/// Every condition field is optional; an absent field never satisfies a
/// condition, whatever its operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub churn_risk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Interaction length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl InteractionEvent {
    /// An event with only `id` set and the current time as timestamp.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            sentiment: None,
            outcome: None,
            query_type: None,
            customer_tier: None,
            churn_risk: None,
            purchase_intent: None,
            channel: None,
            duration: None,
        }
    }

    /// Canonical textual value of a field, or `None` when absent or unknown.
    pub fn field(&self, field: &ConditionField) -> Option<Cow<'_, str>> {
        let text = match field {
            ConditionField::Sentiment => self.sentiment.as_deref(),
            ConditionField::Outcome => self.outcome.as_deref(),
            ConditionField::QueryType => self.query_type.as_deref(),
            ConditionField::CustomerTier => self.customer_tier.as_deref(),
            ConditionField::ChurnRisk => self.churn_risk.as_deref(),
            ConditionField::PurchaseIntent => self.purchase_intent.as_deref(),
            ConditionField::Channel => self.channel.as_deref(),
            ConditionField::Duration => {
                return self.duration.map(|secs| Cow::Owned(secs.to_string()));
            }
            ConditionField::Unknown(_) => None,
        };
        text.map(Cow::Borrowed)
    }

    pub fn with(mut self, field: ConditionField, value: impl Into<String>) -> Self {
        let value = value.into();
        match field {
            ConditionField::Sentiment => self.sentiment = Some(value),
            ConditionField::Outcome => self.outcome = Some(value),
            ConditionField::QueryType => self.query_type = Some(value),
            ConditionField::CustomerTier => self.customer_tier = Some(value),
            ConditionField::ChurnRisk => self.churn_risk = Some(value),
            ConditionField::PurchaseIntent => self.purchase_intent = Some(value),
            ConditionField::Channel => self.channel = Some(value),
            ConditionField::Duration => self.duration = value.parse().ok(),
            ConditionField::Unknown(_) => {}
        }
        self
    }
}
