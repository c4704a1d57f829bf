//! Segment store: named rule sets with a cached subscriber count.
//!
//! Data is held in a DashMap. Saves and updates validate the draft, run the
//! evaluator synchronously against the live subscriber source, and store the
//! result as the segment's cache. Concurrent writes to the same id are
//! last-write-wins; there is no optimistic locking. The cached count is
//! not refreshed when subscriber attributes drift, so callers that need an
//! exact audience re-evaluate at use time (see [`crate::audience`]).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use segment_core::error::{SegmentError, SegmentResult};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::condition::RuleSet;
use crate::evaluator::{EvaluationResult, Evaluator, DEFAULT_SAMPLE_LIMIT};
use crate::subscribers::SubscriberSource;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    pub rules: RuleSet,
    pub subscriber_count: u64,
    pub last_calculated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unsaved segment as submitted from the builder.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SegmentDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rules: RuleSet,
}

impl SegmentDraft {
    pub fn new(name: impl Into<String>, rules: RuleSet) -> Self {
        Self {
            name: name.into(),
            description: None,
            rules,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Name present, every condition well formed, at least one condition
    /// carrying a value. Checked before any evaluation or write.
    pub fn validate(&self) -> SegmentResult<()> {
        if self.name.trim().is_empty() {
            return Err(SegmentError::Validation("segment name is required".into()));
        }
        self.rules.validate()?;
        if !self.rules.is_evaluable() {
            return Err(SegmentError::Validation(
                "at least one condition with a value is required".into(),
            ));
        }
        Ok(())
    }
}

pub struct SegmentStore {
    segments: DashMap<Uuid, Segment>,
    subscribers: Arc<dyn SubscriberSource>,
    sample_limit: usize,
}

impl SegmentStore {
    pub fn new(subscribers: Arc<dyn SubscriberSource>) -> Self {
        Self {
            segments: DashMap::new(),
            subscribers,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }

    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn subscribers(&self) -> &Arc<dyn SubscriberSource> {
        &self.subscribers
    }

    /// Evaluate a rule set against the live population without persisting.
    pub fn evaluate(&self, rules: &RuleSet) -> SegmentResult<EvaluationResult> {
        rules.validate()?;
        Ok(self.run(rules).1)
    }

    pub fn save(&self, draft: SegmentDraft) -> SegmentResult<Segment> {
        draft.validate()?;
        let (calculated_at, result) = self.run(&draft.rules);

        let segment = Segment {
            id: Uuid::new_v4(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            rules: draft.rules,
            subscriber_count: result.count,
            last_calculated_at: Some(calculated_at),
            created_at: calculated_at,
            updated_at: calculated_at,
        };
        self.segments.insert(segment.id, segment.clone());

        info!(
            segment_id = %segment.id,
            name = %segment.name,
            subscriber_count = segment.subscriber_count,
            "Segment saved"
        );
        Ok(segment)
    }

    pub fn update(&self, id: Uuid, draft: SegmentDraft) -> SegmentResult<Segment> {
        draft.validate()?;
        if !self.segments.contains_key(&id) {
            return Err(SegmentError::NotFound(id));
        }
        let (calculated_at, result) = self.run(&draft.rules);

        let mut entry = self.segments.get_mut(&id).ok_or(SegmentError::NotFound(id))?;
        let segment = entry.value_mut();
        segment.name = draft.name.trim().to_string();
        segment.description = draft.description;
        segment.rules = draft.rules;
        segment.subscriber_count = result.count;
        segment.last_calculated_at = Some(calculated_at);
        segment.updated_at = calculated_at;

        info!(
            segment_id = %id,
            subscriber_count = segment.subscriber_count,
            "Segment updated"
        );
        Ok(segment.clone())
    }

    /// Refresh the cached count without touching the rules.
    pub fn recalculate(&self, id: Uuid) -> SegmentResult<Segment> {
        let rules = self.get(id).ok_or(SegmentError::NotFound(id))?.rules;
        let (calculated_at, result) = self.run(&rules);

        let mut entry = self.segments.get_mut(&id).ok_or(SegmentError::NotFound(id))?;
        let segment = entry.value_mut();
        segment.subscriber_count = result.count;
        segment.last_calculated_at = Some(calculated_at);

        info!(segment_id = %id, subscriber_count = result.count, "Segment recalculated");
        Ok(segment.clone())
    }

    /// Remove a segment. References held elsewhere are left dangling.
    pub fn delete(&self, id: Uuid) -> bool {
        let removed = self.segments.remove(&id).is_some();
        if removed {
            info!(segment_id = %id, "Segment deleted");
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<Segment> {
        self.segments.get(&id).map(|r| r.value().clone())
    }

    /// All segments, newest first.
    pub fn list(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = self.segments.iter().map(|r| r.value().clone()).collect();
        segments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Evaluate against the live population with the configured sample
    /// limit, returning the evaluation instant alongside the result.
    pub(crate) fn run(&self, rules: &RuleSet) -> (DateTime<Utc>, EvaluationResult) {
        let evaluator = Evaluator::new().with_sample_limit(self.sample_limit);
        let result = evaluator.evaluate(rules, self.subscribers.stream());
        (evaluator.now(), result)
    }
}
