//! Field registry and operator table: which subscriber attributes can be
//! segmented on, and which comparisons are legal for each.

use segment_core::types::EngagementLevel;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Segmentable subscriber field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Source,
    Tags,
    SubscribedDaysAgo,
    EngagementScore,
    EngagementLevel,
    EmailsReceived,
    LastEmailedDaysAgo,
    LastOpenedDaysAgo,
}

/// Semantic type of a field. Determines both the operator menu and the
/// shape a condition value must take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Array,
    Number,
    Enum,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
}

/// Catalogue row served to the rule builder.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldDescriptor {
    pub name: FieldName,
    pub label: String,
    pub field_type: FieldType,
    pub operators: Vec<Operator>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

const TEXT_OPERATORS: &[Operator] = &[
    Operator::Equals,
    Operator::NotEquals,
    Operator::In,
    Operator::NotIn,
];
const ARRAY_OPERATORS: &[Operator] = &[Operator::Contains, Operator::NotContains];
const NUMBER_OPERATORS: &[Operator] = &[
    Operator::Equals,
    Operator::GreaterThan,
    Operator::LessThan,
];

impl FieldName {
    pub const ALL: [FieldName; 8] = [
        FieldName::Source,
        FieldName::Tags,
        FieldName::SubscribedDaysAgo,
        FieldName::EngagementScore,
        FieldName::EngagementLevel,
        FieldName::EmailsReceived,
        FieldName::LastEmailedDaysAgo,
        FieldName::LastOpenedDaysAgo,
    ];

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldName::Source => FieldType::Text,
            FieldName::Tags => FieldType::Array,
            FieldName::EngagementLevel => FieldType::Enum,
            FieldName::SubscribedDaysAgo
            | FieldName::EngagementScore
            | FieldName::EmailsReceived
            | FieldName::LastEmailedDaysAgo
            | FieldName::LastOpenedDaysAgo => FieldType::Number,
        }
    }

    pub fn operators(&self) -> &'static [Operator] {
        self.field_type().operators()
    }

    /// First operator of the field type's menu.
    pub fn default_operator(&self) -> Operator {
        self.field_type().default_operator()
    }

    pub fn allows(&self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }

    /// Enumeration values for enum fields; empty for every other type.
    pub fn allowed_values(&self) -> Vec<&'static str> {
        match self {
            FieldName::EngagementLevel => {
                EngagementLevel::ALL.iter().map(|l| l.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldName::Source => "Source",
            FieldName::Tags => "Tags",
            FieldName::SubscribedDaysAgo => "Days since subscribed",
            FieldName::EngagementScore => "Engagement score",
            FieldName::EngagementLevel => "Engagement level",
            FieldName::EmailsReceived => "Emails received",
            FieldName::LastEmailedDaysAgo => "Days since last emailed",
            FieldName::LastOpenedDaysAgo => "Days since last opened",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Source => "source",
            FieldName::Tags => "tags",
            FieldName::SubscribedDaysAgo => "subscribed_days_ago",
            FieldName::EngagementScore => "engagement_score",
            FieldName::EngagementLevel => "engagement_level",
            FieldName::EmailsReceived => "emails_received",
            FieldName::LastEmailedDaysAgo => "last_emailed_days_ago",
            FieldName::LastOpenedDaysAgo => "last_opened_days_ago",
        }
    }

    pub fn descriptor(&self) -> FieldDescriptor {
        FieldDescriptor {
            name: *self,
            label: self.label().to_string(),
            field_type: self.field_type(),
            operators: self.operators().to_vec(),
            allowed_values: self
                .allowed_values()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl FieldType {
    pub fn operators(&self) -> &'static [Operator] {
        match self {
            FieldType::Text | FieldType::Enum => TEXT_OPERATORS,
            FieldType::Array => ARRAY_OPERATORS,
            FieldType::Number => NUMBER_OPERATORS,
        }
    }

    pub fn default_operator(&self) -> Operator {
        match self {
            FieldType::Text | FieldType::Enum | FieldType::Number => Operator::Equals,
            FieldType::Array => Operator::Contains,
        }
    }
}

impl Operator {
    /// `in`/`not_in` take a list of values; every other operator takes one.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
        }
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full field catalogue, in builder display order.
pub fn catalogue() -> Vec<FieldDescriptor> {
    FieldName::ALL.iter().map(|f| f.descriptor()).collect()
}
