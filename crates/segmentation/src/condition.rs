//! Condition and rule set model.
//!
//! A [`Condition`] is a (field, operator, value) triple whose value shape is
//! fixed by the operator's arity. Structural legality is checked whenever a
//! condition is built or edited; emptiness is not an error, it only makes the
//! condition non-evaluable so the evaluator filters it out.

use segment_core::error::{SegmentError, SegmentResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::fields::{FieldName, FieldType, Operator};

/// A condition value: a single scalar or a list, depending on the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Condition {
    pub field: FieldName,
    pub operator: Operator,
    pub value: ConditionValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

/// Match mode plus an ordered list of conditions. This JSON shape is both the
/// wire format and the stored format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
pub struct RuleSet {
    #[serde(rename = "match", default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionValue {
    /// Empty value of the shape the operator expects.
    pub fn empty_for(operator: Operator) -> Self {
        if operator.is_multi_valued() {
            ConditionValue::List(Vec::new())
        } else {
            ConditionValue::Scalar(String::new())
        }
    }

    /// Blank scalar, or a list with no non-blank entry.
    pub fn is_empty(&self) -> bool {
        match self {
            ConditionValue::Scalar(s) => s.trim().is_empty(),
            ConditionValue::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ConditionValue::List(_))
    }

    /// Non-blank entries, in order. A scalar yields itself.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            ConditionValue::Scalar(s) => std::slice::from_ref(s),
            ConditionValue::List(items) => items.as_slice(),
        };
        items
            .iter()
            .map(String::as_str)
            .filter(|i| !i.trim().is_empty())
    }

    fn into_shape(self, multi_valued: bool) -> Self {
        match (self, multi_valued) {
            (ConditionValue::Scalar(s), true) if s.trim().is_empty() => {
                ConditionValue::List(Vec::new())
            }
            (ConditionValue::Scalar(s), true) => ConditionValue::List(vec![s]),
            (ConditionValue::List(items), false) => {
                ConditionValue::Scalar(items.into_iter().next().unwrap_or_default())
            }
            (value, _) => value,
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::Scalar(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::Scalar(value)
    }
}

impl From<Vec<String>> for ConditionValue {
    fn from(values: Vec<String>) -> Self {
        ConditionValue::List(values)
    }
}

impl From<Vec<&str>> for ConditionValue {
    fn from(values: Vec<&str>) -> Self {
        ConditionValue::List(values.into_iter().map(str::to_string).collect())
    }
}

impl Condition {
    /// Build a condition, rejecting illegal operator/field pairs and
    /// arity mismatches.
    pub fn new(
        field: FieldName,
        operator: Operator,
        value: impl Into<ConditionValue>,
    ) -> SegmentResult<Self> {
        let condition = Self {
            field,
            operator,
            value: value.into(),
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Fresh condition for a field: default operator, empty value.
    pub fn for_field(field: FieldName) -> Self {
        let operator = field.default_operator();
        Self {
            field,
            operator,
            value: ConditionValue::empty_for(operator),
        }
    }

    /// Switch to another field. Operator resets to the field's default and
    /// the value resets to an empty value of the matching shape.
    pub fn with_field(self, field: FieldName) -> Self {
        Self::for_field(field)
    }

    /// Switch operator on the same field, coercing the value across arities.
    pub fn with_operator(self, operator: Operator) -> SegmentResult<Self> {
        if !self.field.allows(operator) {
            return Err(illegal_operator(self.field, operator));
        }
        let value = self.value.into_shape(operator.is_multi_valued());
        Ok(Self {
            field: self.field,
            operator,
            value,
        })
    }

    pub fn with_value(self, value: impl Into<ConditionValue>) -> SegmentResult<Self> {
        Self::new(self.field, self.operator, value)
    }

    /// Structural check: operator legal for the field, value arity matches
    /// the operator, enum values drawn from the field's enumeration.
    pub fn validate(&self) -> SegmentResult<()> {
        if !self.field.allows(self.operator) {
            return Err(illegal_operator(self.field, self.operator));
        }
        match (&self.value, self.operator.is_multi_valued()) {
            (ConditionValue::Scalar(_), true) => {
                return Err(SegmentError::MalformedCondition(format!(
                    "operator '{}' on '{}' requires a list of values",
                    self.operator, self.field
                )));
            }
            (ConditionValue::List(_), false) => {
                return Err(SegmentError::MalformedCondition(format!(
                    "operator '{}' on '{}' requires a single value",
                    self.operator, self.field
                )));
            }
            _ => {}
        }
        if self.field.field_type() == FieldType::Enum {
            let allowed = self.field.allowed_values();
            if let Some(unknown) = self.value.entries().find(|v| !allowed.iter().any(|a| a == v)) {
                return Err(SegmentError::MalformedCondition(format!(
                    "'{}' is not a valid value for '{}'",
                    unknown, self.field
                )));
            }
        }
        Ok(())
    }

    /// Whether the condition takes part in evaluation. Blank values, empty
    /// lists, and number fields whose value does not parse are excluded.
    pub fn is_evaluable(&self) -> bool {
        if self.validate().is_err() || self.value.is_empty() {
            return false;
        }
        match self.field.field_type() {
            FieldType::Number => self.numeric_value().is_some(),
            _ => true,
        }
    }

    pub(crate) fn numeric_value(&self) -> Option<f64> {
        match &self.value {
            ConditionValue::Scalar(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            ConditionValue::List(_) => None,
        }
    }
}

impl RuleSet {
    pub fn new(match_mode: MatchMode, conditions: Vec<Condition>) -> Self {
        Self {
            match_mode,
            conditions,
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::new(MatchMode::All, conditions)
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::new(MatchMode::Any, conditions)
    }

    pub fn evaluable_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| c.is_evaluable())
    }

    /// At least one condition carries a usable value.
    pub fn is_evaluable(&self) -> bool {
        self.evaluable_conditions().next().is_some()
    }

    /// Validate every condition's structure. Used at the API boundary, where
    /// rule sets arrive without going through [`Condition::new`].
    pub fn validate(&self) -> SegmentResult<()> {
        for (index, condition) in self.conditions.iter().enumerate() {
            condition.validate().map_err(|e| match e {
                SegmentError::MalformedCondition(msg) => {
                    SegmentError::MalformedCondition(format!("condition {}: {}", index + 1, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

fn illegal_operator(field: FieldName, operator: Operator) -> SegmentError {
    SegmentError::MalformedCondition(format!(
        "operator '{}' is not allowed for field '{}'",
        operator, field
    ))
}
