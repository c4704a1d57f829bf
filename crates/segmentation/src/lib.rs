//! Subscriber segmentation engine: field registry, rule model, evaluator,
//! segment persistence, and live preview orchestration.

pub mod audience;
pub mod builder;
pub mod condition;
pub mod debounce;
pub mod evaluator;
pub mod fields;
pub mod preview;
pub mod store;
pub mod subscribers;

pub use audience::{AudienceResolution, CampaignAudience};
pub use builder::SegmentBuilder;
pub use condition::{Condition, ConditionValue, MatchMode, RuleSet};
pub use evaluator::{EvaluationResult, Evaluator};
pub use fields::{FieldName, FieldType, Operator};
pub use preview::{PreviewBackend, PreviewService, PreviewState};
pub use store::{Segment, SegmentDraft, SegmentStore};
pub use subscribers::{InMemorySubscriberStore, SubscriberSource};
