//! Live preview orchestration for the segment builder.
//!
//! Every edit is tagged with a generation number the moment it arrives, so a
//! newer edit supersedes any evaluation already running even while the edit
//! itself is still waiting out the debounce window. Completions are applied
//! only if their generation is still the latest one; anything older is
//! dropped. Superseded evaluations are left to finish on their own, they
//! simply never become visible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use segment_core::config::PreviewConfig;
use segment_core::error::SegmentResult;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::condition::RuleSet;
use crate::debounce::debounce;
use crate::evaluator::EvaluationResult;
use crate::store::SegmentStore;

/// Something that can evaluate a draft rule set, locally or over the network.
#[async_trait]
pub trait PreviewBackend: Send + Sync {
    async fn evaluate(&self, rules: RuleSet) -> SegmentResult<EvaluationResult>;
}

#[async_trait]
impl PreviewBackend for SegmentStore {
    async fn evaluate(&self, rules: RuleSet) -> SegmentResult<EvaluationResult> {
        SegmentStore::evaluate(self, &rules)
    }
}

/// What the builder shows next to the draft.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PreviewState {
    /// No result: nothing evaluated yet, or the last evaluation failed.
    #[default]
    Empty,
    Loading {
        generation: u64,
    },
    Ready {
        generation: u64,
        result: EvaluationResult,
    },
}

impl PreviewState {
    pub fn result(&self) -> Option<&EvaluationResult> {
        match self {
            PreviewState::Ready { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, PreviewState::Loading { .. })
    }
}

const EDIT_BUFFER: usize = 16;

pub struct PreviewService {
    backend: Arc<dyn PreviewBackend>,
    generation: AtomicU64,
    state: watch::Sender<PreviewState>,
    window: Duration,
}

impl PreviewService {
    /// Service with the default debounce window.
    pub fn new(backend: Arc<dyn PreviewBackend>) -> Self {
        Self::with_config(backend, &PreviewConfig::default())
    }

    /// Service whose debounce window comes from `preview.debounce_ms`.
    pub fn with_config(backend: Arc<dyn PreviewBackend>, config: &PreviewConfig) -> Self {
        let (state, _) = watch::channel(PreviewState::Empty);
        Self {
            backend,
            generation: AtomicU64::new(0),
            state,
            window: config.debounce(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PreviewState {
        self.state.borrow().clone()
    }

    pub fn latest_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Issue a new generation and mark it loading. Every earlier generation
    /// is superseded from this point on.
    pub fn begin(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_if_modified(|state| {
            if generation != self.latest_generation() {
                return false;
            }
            *state = PreviewState::Loading { generation };
            true
        });
        generation
    }

    /// Apply the outcome of `generation` if it is still the latest. Returns
    /// whether it was applied. A failure clears the preview.
    pub fn complete(&self, generation: u64, outcome: SegmentResult<EvaluationResult>) -> bool {
        let applied = self.state.send_if_modified(|state| {
            if generation != self.latest_generation() {
                return false;
            }
            *state = match outcome {
                Ok(result) => PreviewState::Ready { generation, result },
                Err(e) => {
                    warn!(generation, error = %e, "Preview evaluation failed");
                    PreviewState::Empty
                }
            };
            true
        });
        if !applied {
            debug!(
                generation,
                latest = self.latest_generation(),
                "Discarding superseded preview result"
            );
        }
        applied
    }

    /// Evaluate a draft now, bypassing the debounce window. A draft with no
    /// evaluable condition resolves to an empty result without calling the
    /// backend.
    pub fn submit(self: &Arc<Self>, rules: RuleSet) -> u64 {
        let generation = self.begin();
        self.dispatch(generation, rules);
        generation
    }

    /// Evaluate `rules` under an already issued generation.
    fn dispatch(self: &Arc<Self>, generation: u64, rules: RuleSet) {
        if !rules.is_evaluable() {
            self.complete(generation, Ok(EvaluationResult::empty()));
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.backend.evaluate(rules).await;
            this.complete(generation, outcome);
        });
    }

    /// Drive previews from a stream of draft edits. Each edit takes a new
    /// generation on arrival, which fences off anything still in flight; the
    /// draft is then debounced by the configured window and evaluated under
    /// the generation of the last edit. Ends when the edit stream closes.
    pub fn run(self: Arc<Self>, mut edits: mpsc::Receiver<RuleSet>) -> JoinHandle<()> {
        let (tagged_tx, tagged_rx) = mpsc::channel(EDIT_BUFFER);
        let tagger = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(rules) = edits.recv().await {
                let generation = tagger.begin();
                if tagged_tx.send((generation, rules)).await.is_err() {
                    return;
                }
            }
        });

        tokio::spawn(async move {
            let mut settled = debounce(tagged_rx, self.window);
            while let Some((generation, rules)) = settled.recv().await {
                debug!(generation, "Preview evaluation issued");
                self.dispatch(generation, rules);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::fields::{FieldName, Operator};
    use segment_core::error::SegmentError;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    /// Backend whose latency and count come from the draft itself:
    /// `emails_received equals <n>` takes n ms and reports count n.
    #[derive(Default)]
    struct ScriptedBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PreviewBackend for ScriptedBackend {
        async fn evaluate(&self, rules: RuleSet) -> SegmentResult<EvaluationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let millis = rules.conditions[0].numeric_value().unwrap_or(0.0) as u64;
            sleep(Duration::from_millis(millis)).await;
            if millis == 13 {
                return Err(SegmentError::Evaluation("upstream unavailable".into()));
            }
            Ok(EvaluationResult {
                count: millis,
                sample: Vec::new(),
            })
        }
    }

    fn draft(millis: u64) -> RuleSet {
        RuleSet::all(vec![Condition::new(
            FieldName::EmailsReceived,
            Operator::Equals,
            millis.to_string(),
        )
        .unwrap()])
    }

    fn ready(count: u64) -> EvaluationResult {
        EvaluationResult {
            count,
            sample: Vec::new(),
        }
    }

    fn service() -> (Arc<PreviewService>, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::default());
        (Arc::new(PreviewService::new(backend.clone())), backend)
    }

    #[test]
    fn test_late_completion_of_older_generation_is_dropped() {
        let (preview, _) = service();
        let g1 = preview.begin();
        let g2 = preview.begin();
        let g3 = preview.begin();
        assert_eq!((g1, g2, g3), (1, 2, 3));

        assert!(preview.complete(g3, Ok(ready(3))));
        assert!(!preview.complete(g2, Ok(ready(2))));
        assert!(!preview.complete(g1, Ok(ready(1))));

        assert_eq!(
            preview.state(),
            PreviewState::Ready {
                generation: 3,
                result: ready(3)
            }
        );
    }

    #[test]
    fn test_stale_result_never_replaces_pending_state() {
        let (preview, _) = service();
        let g1 = preview.begin();
        let g2 = preview.begin();

        assert!(!preview.complete(g1, Ok(ready(1))));
        assert_eq!(preview.state(), PreviewState::Loading { generation: g2 });
    }

    #[test]
    fn test_failure_resets_to_empty() {
        let (preview, _) = service();
        let g1 = preview.begin();
        preview.complete(g1, Ok(ready(5)));

        let g2 = preview.begin();
        assert!(preview.complete(
            g2,
            Err(SegmentError::Evaluation("timeout".into()))
        ));
        assert_eq!(preview.state(), PreviewState::Empty);
        assert!(preview.state().result().is_none());
    }

    #[test]
    fn test_stale_failure_is_ignored() {
        let (preview, _) = service();
        let g1 = preview.begin();
        let g2 = preview.begin();
        preview.complete(g2, Ok(ready(2)));

        assert!(!preview.complete(g1, Err(SegmentError::Evaluation("late".into()))));
        assert_eq!(preview.state().result(), Some(&ready(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_generation_wins_under_out_of_order_completion() {
        let (preview, backend) = service();

        // Generation 2 is the slowest and finishes after generation 3.
        preview.submit(draft(300));
        preview.submit(draft(500));
        let last = preview.submit(draft(100));
        assert!(preview.state().is_loading());

        sleep(Duration::from_secs(1)).await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            preview.state(),
            PreviewState::Ready {
                generation: last,
                result: ready(100)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_without_values_skips_backend() {
        let (preview, backend) = service();
        let generation = preview.submit(RuleSet::all(vec![Condition::for_field(
            FieldName::Tags,
        )]));

        assert_eq!(
            preview.state(),
            PreviewState::Ready {
                generation,
                result: EvaluationResult::empty()
            }
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_clears_preview_and_next_edit_recovers() {
        let (preview, _) = service();
        preview.submit(draft(13));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(preview.state(), PreviewState::Empty);

        preview.submit(draft(20));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(preview.state().result(), Some(&ready(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_debounces_edits_into_one_evaluation() {
        let (preview, backend) = service();
        let (edits, rx) = mpsc::channel(8);
        let mut observed = preview.subscribe();
        let handle = preview.clone().run(rx);

        for millis in [40, 41, 42] {
            edits.send(draft(millis)).await.unwrap();
            sleep(Duration::from_millis(100)).await;
        }

        observed
            .wait_for(|state| state.result().is_some())
            .await
            .unwrap();
        assert_eq!(preview.state().result(), Some(&ready(42)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        drop(edits);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_running_evaluation_hides_its_result() {
        let (preview, backend) = service();
        let (edits, rx) = mpsc::channel(8);
        let handle = preview.clone().run(rx);

        // Draft A settles at t=500 and its evaluation runs until t=800.
        edits.send(draft(300)).await.unwrap();
        sleep(Duration::from_millis(600)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Draft B arrives at t=600, while A is still evaluating.
        edits.send(draft(40)).await.unwrap();
        sleep(Duration::from_millis(300)).await;

        let state = preview.state();
        assert!(state.result().is_none(), "superseded draft surfaced: {state:?}");
        assert_eq!(state, PreviewState::Loading { generation: 2 });

        // B settles at t=1100 and finishes at t=1140.
        sleep(Duration::from_millis(300)).await;
        assert_eq!(
            preview.state(),
            PreviewState::Ready {
                generation: 2,
                result: ready(40)
            }
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        drop(edits);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_uses_configured_window() {
        let backend = Arc::new(ScriptedBackend::default());
        let config = PreviewConfig {
            debounce_ms: 100,
            ..PreviewConfig::default()
        };
        let preview = Arc::new(PreviewService::with_config(backend.clone(), &config));
        assert_eq!(preview.window(), Duration::from_millis(100));

        let (edits, rx) = mpsc::channel(8);
        let handle = preview.clone().run(rx);
        edits.send(draft(10)).await.unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(preview.state().result(), Some(&ready(10)));

        drop(edits);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_store_backend_evaluates_locally() {
        use crate::subscribers::InMemorySubscriberStore;
        use chrono::Utc;
        use segment_core::types::Subscriber;

        let mut subscriber = Subscriber::new("a@example.com", Utc::now());
        subscriber.emails_received = 7;
        let store = Arc::new(SegmentStore::new(Arc::new(
            InMemorySubscriberStore::with_subscribers(vec![subscriber]),
        )));
        let preview = Arc::new(PreviewService::new(store));

        let mut observed = preview.subscribe();
        preview.submit(draft(7));
        let state = observed
            .wait_for(|state| state.result().is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(state.result().map(|r| r.count), Some(1));
    }
}
