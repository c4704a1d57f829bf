//! Segment builder: fluent API for composing a segment draft in code.

use segment_core::error::{SegmentError, SegmentResult};
use segment_core::types::EngagementLevel;

use crate::condition::{Condition, ConditionValue, MatchMode, RuleSet};
use crate::fields::{FieldName, Operator};
use crate::store::SegmentDraft;

pub struct SegmentBuilder {
    name: String,
    description: Option<String>,
    match_mode: MatchMode,
    conditions: Vec<Condition>,
    error: Option<String>,
}

impl SegmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            match_mode: MatchMode::All,
            conditions: Vec::new(),
            error: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Match subscribers satisfying any condition instead of all of them.
    pub fn match_any(mut self) -> Self {
        self.match_mode = MatchMode::Any;
        self
    }

    /// Append a condition. The first malformed condition is reported by
    /// [`SegmentBuilder::build`].
    pub fn condition(
        mut self,
        field: FieldName,
        operator: Operator,
        value: impl Into<ConditionValue>,
    ) -> Self {
        match Condition::new(field, operator, value) {
            Ok(condition) => self.conditions.push(condition),
            Err(e) if self.error.is_none() => {
                self.error = Some(match e {
                    SegmentError::MalformedCondition(msg) => msg,
                    other => other.to_string(),
                });
            }
            Err(_) => {}
        }
        self
    }

    pub fn source_is(self, source: impl Into<String>) -> Self {
        self.condition(FieldName::Source, Operator::Equals, source.into())
    }

    pub fn source_in(self, sources: Vec<&str>) -> Self {
        self.condition(FieldName::Source, Operator::In, sources)
    }

    pub fn tagged(self, tag: impl Into<String>) -> Self {
        self.condition(FieldName::Tags, Operator::Contains, tag.into())
    }

    pub fn not_tagged(self, tag: impl Into<String>) -> Self {
        self.condition(FieldName::Tags, Operator::NotContains, tag.into())
    }

    pub fn engagement_in(self, levels: &[EngagementLevel]) -> Self {
        let values: Vec<String> = levels.iter().map(|l| l.as_str().to_string()).collect();
        self.condition(FieldName::EngagementLevel, Operator::In, values)
    }

    pub fn subscribed_more_than_days(self, days: u32) -> Self {
        self.condition(
            FieldName::SubscribedDaysAgo,
            Operator::GreaterThan,
            days.to_string(),
        )
    }

    pub fn not_opened_within_days(self, days: u32) -> Self {
        self.condition(
            FieldName::LastOpenedDaysAgo,
            Operator::GreaterThan,
            days.to_string(),
        )
    }

    pub fn engagement_score_above(self, score: f64) -> Self {
        self.condition(
            FieldName::EngagementScore,
            Operator::GreaterThan,
            score.to_string(),
        )
    }

    pub fn rules(&self) -> SegmentResult<RuleSet> {
        if let Some(msg) = &self.error {
            return Err(SegmentError::MalformedCondition(msg.clone()));
        }
        Ok(RuleSet::new(self.match_mode, self.conditions.clone()))
    }

    /// Produce a validated draft ready for [`crate::store::SegmentStore::save`].
    pub fn build(self) -> SegmentResult<SegmentDraft> {
        let rules = self.rules()?;
        let draft = SegmentDraft {
            name: self.name,
            description: self.description,
            rules,
        };
        draft.validate()?;
        Ok(draft)
    }
}
