//! Campaign audience resolution. Campaigns reference segments by id; a
//! segment may have been deleted since, and its cached count may be stale.
//! Resolution therefore re-evaluates at send time and reports a deleted
//! segment as dangling instead of failing.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::evaluator::EvaluationResult;
use crate::store::{Segment, SegmentStore};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AudienceResolution {
    /// Segment exists; `live` is evaluated now, not read from the cache.
    Targetable {
        segment: Segment,
        live: EvaluationResult,
    },
    /// Segment id no longer resolves. The campaign is no longer targetable.
    Dangling { segment_id: Uuid },
}

pub struct CampaignAudience {
    store: Arc<SegmentStore>,
}

impl CampaignAudience {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, segment_id: Uuid) -> AudienceResolution {
        let Some(segment) = self.store.get(segment_id) else {
            warn!(segment_id = %segment_id, "Campaign references a deleted segment");
            return AudienceResolution::Dangling { segment_id };
        };
        let (_, live) = self.store.run(&segment.rules);
        AudienceResolution::Targetable { segment, live }
    }
}

impl AudienceResolution {
    pub fn is_targetable(&self) -> bool {
        matches!(self, AudienceResolution::Targetable { .. })
    }

    /// Live audience size; zero for a dangling reference.
    pub fn audience_size(&self) -> u64 {
        match self {
            AudienceResolution::Targetable { live, .. } => live.count,
            AudienceResolution::Dangling { .. } => 0,
        }
    }
}
