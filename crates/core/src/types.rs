use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

const SECONDS_PER_DAY: i64 = 86_400;

/// Subscriber record as seen by the segmentation engine. Owned by the
/// subscriber store; never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub subscribed_at: DateTime<Utc>,
    #[serde(default)]
    pub engagement_score: Option<f64>,
    #[serde(default)]
    pub engagement_level: Option<EngagementLevel>,
    #[serde(default)]
    pub emails_received: u32,
    /// Last time a campaign email was sent to this subscriber.
    #[serde(default)]
    pub email_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    HighlyEngaged,
    Engaged,
    Cold,
    AtRisk,
    Churned,
    New,
}

/// Compact projection of a subscriber returned in preview samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberSummary {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub engagement_level: Option<EngagementLevel>,
}

impl EngagementLevel {
    pub const ALL: [EngagementLevel; 6] = [
        EngagementLevel::HighlyEngaged,
        EngagementLevel::Engaged,
        EngagementLevel::Cold,
        EngagementLevel::AtRisk,
        EngagementLevel::Churned,
        EngagementLevel::New,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::HighlyEngaged => "highly_engaged",
            EngagementLevel::Engaged => "engaged",
            EngagementLevel::Cold => "cold",
            EngagementLevel::AtRisk => "at_risk",
            EngagementLevel::Churned => "churned",
            EngagementLevel::New => "new",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == value)
    }
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Subscriber {
    pub fn new(email: impl Into<String>, subscribed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            source: None,
            tags: Vec::new(),
            subscribed_at,
            engagement_score: None,
            engagement_level: None,
            emails_received: 0,
            email_sent_at: None,
            last_opened_at: None,
        }
    }

    pub fn summary(&self) -> SubscriberSummary {
        SubscriberSummary {
            id: self.id,
            email: self.email.clone(),
            engagement_level: self.engagement_level,
        }
    }

    pub fn subscribed_days_ago(&self, now: DateTime<Utc>) -> i64 {
        days_between(self.subscribed_at, now)
    }

    pub fn last_emailed_days_ago(&self, now: DateTime<Utc>) -> Option<i64> {
        self.email_sent_at.map(|at| days_between(at, now))
    }

    pub fn last_opened_days_ago(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_opened_at.map(|at| days_between(at, now))
    }
}

/// Whole days elapsed from `from` to `now`, floored.
pub fn days_between(from: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}
