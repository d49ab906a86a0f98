//! Streaming orchestration.
//!
//! Drives one extractor against a provider token stream and turns the result
//! into an ordered stream of [`StreamUpdate`]s that always ends with exactly one
//! terminal update (`Complete` or `Error`).

use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{VisionError, VisionResult};
use crate::extractor::{DEFAULT_MIN_CONFIDENCE, ItemSanitizer, ObjectExtractor, RankingExtractor};
use crate::models::{
    ImagePayload, RankedCandidate, RankingJob, RecognizedItem, StreamMetrics, TokenUsage,
};
use crate::prompts::{RECOGNITION_PROMPT, ranking_prompt};
use crate::provider::{GenerationRequest, StreamChunk, TokenStreamProvider};
use crate::usage::{UsageEvent, UsageRecorder};

pub const DEFAULT_MAX_RANKINGS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub min_confidence: u8,
    /// Hard cap on forwarded ranking candidates
    pub max_rankings: usize,
    /// Optional budget for a whole stream, measured from the provider call
    pub deadline: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_rankings: DEFAULT_MAX_RANKINGS,
            deadline: None,
        }
    }
}

/// One step of an orchestrated stream
#[derive(Debug)]
pub enum StreamUpdate {
    Item(RecognizedItem),
    Ranking(RankedCandidate),
    Complete(StreamMetrics),
    Error(VisionError),
}

impl StreamUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamUpdate::Complete(_) | StreamUpdate::Error(_))
    }
}

pub type UpdateStream = Pin<Box<dyn Stream<Item = StreamUpdate> + Send>>;

enum Extraction {
    Items(ObjectExtractor),
    Rankings {
        extractor: RankingExtractor,
        remaining: usize,
    },
}

impl Extraction {
    fn feed(&mut self, text: &str) -> Vec<StreamUpdate> {
        match self {
            Extraction::Items(extractor) => extractor
                .parse(text)
                .into_iter()
                .map(StreamUpdate::Item)
                .collect(),
            Extraction::Rankings {
                extractor,
                remaining,
            } => {
                let found = extractor.parse(text);
                Self::take_rankings(found, remaining)
            }
        }
    }

    fn finish(&mut self) -> Vec<StreamUpdate> {
        match self {
            Extraction::Items(_) => Vec::new(),
            Extraction::Rankings {
                extractor,
                remaining,
            } => {
                let found = extractor.flush();
                Self::take_rankings(found, remaining)
            }
        }
    }

    fn take_rankings(found: Vec<RankedCandidate>, remaining: &mut usize) -> Vec<StreamUpdate> {
        let taken: Vec<StreamUpdate> = found
            .into_iter()
            .take(*remaining)
            .map(StreamUpdate::Ranking)
            .collect();
        *remaining -= taken.len();
        taken
    }

    fn saturated(&self) -> bool {
        matches!(self, Extraction::Rankings { remaining: 0, .. })
    }
}

/// Orchestrates provider streams for recognition and ranking
#[derive(Clone)]
pub struct VisionOrchestrator {
    provider: Arc<dyn TokenStreamProvider>,
    usage: Arc<dyn UsageRecorder>,
    config: OrchestratorConfig,
}

impl VisionOrchestrator {
    pub fn new(
        provider: Arc<dyn TokenStreamProvider>,
        usage: Arc<dyn UsageRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            usage,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn TokenStreamProvider {
        self.provider.as_ref()
    }

    /// Fails with `RankingUnsupported` unless the provider can rank.
    pub fn ensure_ranking_supported(&self) -> VisionResult<()> {
        if self.provider.capabilities().ranking {
            Ok(())
        } else {
            Err(VisionError::RankingUnsupported(self.provider.kind()))
        }
    }

    /// Recognize products in `image`.
    pub fn analyze(&self, image: ImagePayload) -> VisionResult<UpdateStream> {
        self.provider.ensure_configured()?;
        self.usage.record(UsageEvent::AnalysisStarted);

        let request = GenerationRequest {
            prompt: RECOGNITION_PROMPT.to_string(),
            images: vec![image],
        };
        let extractor = ObjectExtractor::new(ItemSanitizer::new(self.config.min_confidence));
        Ok(self.run(request, Extraction::Items(extractor)))
    }

    /// Rank `job.candidates` by visual similarity to the original image.
    pub fn rank(&self, job: RankingJob) -> VisionResult<UpdateStream> {
        self.ensure_ranking_supported()?;
        self.provider.ensure_configured()?;
        if job.candidates.is_empty() {
            return Err(VisionError::Validation(
                "at least one candidate is required".to_string(),
            ));
        }
        self.usage.record(UsageEvent::RankingStarted);

        let prompt = ranking_prompt(&job, self.config.max_rankings);
        let mut images = Vec::with_capacity(job.candidates.len() + 1);
        images.push(job.original);
        images.extend(
            job.candidates
                .into_iter()
                .map(|c| ImagePayload::new(c.image)),
        );

        Ok(self.run(
            GenerationRequest { prompt, images },
            Extraction::Rankings {
                extractor: RankingExtractor::new(),
                remaining: self.config.max_rankings,
            },
        ))
    }

    fn run(&self, request: GenerationRequest, mut extraction: Extraction) -> UpdateStream {
        let provider = Arc::clone(&self.provider);
        let usage = Arc::clone(&self.usage);
        let kind = provider.kind();
        let model = provider.model().to_string();
        let budget = self.config.deadline;

        Box::pin(async_stream::stream! {
            let started = Instant::now();
            let deadline = budget.map(|budget| started + budget);
            let mut first_token_ms = None;
            let mut records = 0usize;
            let mut token_usage = TokenUsage::default();

            let tokens = with_deadline(deadline, provider.stream(request))
                .await
                .and_then(|opened| opened);
            let mut tokens = match tokens {
                Ok(tokens) => tokens,
                Err(err) => {
                    warn!(provider = %kind, code = err.code(), error = %err, "Provider stream failed to open");
                    usage.record(UsageEvent::StreamFailed { records, code: err.code() });
                    yield StreamUpdate::Error(err);
                    return;
                }
            };

            let failure = loop {
                let next = match with_deadline(deadline, tokens.next()).await {
                    Ok(next) => next,
                    Err(err) => break Some(err),
                };
                match next {
                    None => break None,
                    Some(Err(err)) => break Some(err),
                    Some(Ok(StreamChunk::Usage(reported))) => token_usage = reported,
                    Some(Ok(StreamChunk::Text(text))) => {
                        if first_token_ms.is_none() {
                            first_token_ms = Some(elapsed_ms(started));
                        }
                        for update in extraction.feed(&text) {
                            records += 1;
                            yield update;
                        }
                        if extraction.saturated() {
                            debug!(records, "Ranking cap reached, stopping provider stream");
                            break None;
                        }
                    }
                }
            };
            // Release the provider connection before flushing.
            drop(tokens);

            if let Some(err) = failure {
                warn!(provider = %kind, code = err.code(), records, error = %err, "Provider stream failed");
                usage.record(UsageEvent::StreamFailed { records, code: err.code() });
                yield StreamUpdate::Error(err);
                return;
            }

            for update in extraction.finish() {
                records += 1;
                yield update;
            }

            let metrics = StreamMetrics {
                first_token_ms,
                total_ms: elapsed_ms(started),
                item_count: records,
                usage: token_usage,
                provider: kind,
                model,
            };
            info!(
                provider = %kind,
                records,
                first_token_ms = ?metrics.first_token_ms,
                total_ms = metrics.total_ms,
                total_tokens = metrics.usage.total_tokens,
                "Stream completed"
            );
            usage.record(UsageEvent::StreamCompleted { records });
            yield StreamUpdate::Complete(metrics);
        })
    }
}

async fn with_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> VisionResult<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| VisionError::Timeout),
        None => Ok(fut.await),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateInput, ProviderCapabilities, ProviderKind};
    use crate::provider::MockTokenStreamProvider;
    use crate::usage::{InMemoryUsageRecorder, MockUsageRecorder};
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const MUG: &str = r#"{"name":"Red Mug","iconCategory":"mug","category":"kitchen_dining","confidence":8}"#;
    const BLURRY: &str = r#"{"name":"Blurry","iconCategory":"other","category":"other","confidence":3}"#;

    fn text(s: &str) -> VisionResult<StreamChunk> {
        Ok(StreamChunk::Text(s.to_string()))
    }

    fn ranking_line(id: usize, rank: usize) -> String {
        format!("{{\"id\":\"c{id}\",\"similarityScore\":{},\"rank\":{rank}}}\n", 100 - id)
    }

    fn mock_provider(ranking: bool) -> MockTokenStreamProvider {
        let mut provider = MockTokenStreamProvider::new();
        provider.expect_kind().return_const(if ranking {
            ProviderKind::Gemini
        } else {
            ProviderKind::OpenAi
        });
        provider
            .expect_capabilities()
            .return_const(ProviderCapabilities { ranking });
        provider
            .expect_model()
            .return_const("test-model".to_string());
        provider.expect_ensure_configured().returning(|| Ok(()));
        provider
    }

    fn scripted<S>(ranking: bool, chunks: S) -> Arc<dyn TokenStreamProvider>
    where
        S: Stream<Item = VisionResult<StreamChunk>> + Send + 'static,
    {
        let mut provider = mock_provider(ranking);
        provider
            .expect_stream()
            .times(1)
            .return_once(move |_| Ok(Box::pin(chunks)));
        Arc::new(provider)
    }

    fn orchestrator(provider: Arc<dyn TokenStreamProvider>) -> VisionOrchestrator {
        VisionOrchestrator::new(
            provider,
            Arc::new(InMemoryUsageRecorder::new()),
            OrchestratorConfig::default(),
        )
    }

    fn job(candidates: usize) -> RankingJob {
        RankingJob {
            original: ImagePayload::new("AAAA"),
            product_name: "Red Mug".to_string(),
            category_tag: "kitchen_dining".to_string(),
            candidates: (0..candidates)
                .map(|i| CandidateInput {
                    id: format!("c{i}"),
                    image: "BBBB".to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_items_forwarded_in_order_then_complete() {
        let (head, tail) = MUG.split_at(30);
        let provider = scripted(
            true,
            stream::iter(vec![
                text("```json\n"),
                text(head),
                text(tail),
                text("\n{\"name\":\"Trail Shoe\",\"iconCategory\":\"shoe\",\"category\":\"footwear\",\"confidence\":9}"),
                Ok(StreamChunk::Usage(TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                    total_tokens: 120,
                })),
            ]),
        );

        let updates: Vec<_> = orchestrator(provider)
            .analyze(ImagePayload::new("AAAA"))
            .unwrap()
            .collect()
            .await;

        assert_eq!(updates.len(), 3);
        assert!(matches!(&updates[0], StreamUpdate::Item(item) if item.name == "Red Mug"));
        assert!(matches!(&updates[1], StreamUpdate::Item(item) if item.name == "Trail Shoe"));
        let StreamUpdate::Complete(metrics) = &updates[2] else {
            panic!("expected complete, got {:?}", updates[2]);
        };
        assert_eq!(metrics.item_count, 2);
        assert_eq!(metrics.usage.total_tokens, 120);
        assert_eq!(metrics.provider, ProviderKind::Gemini);
        assert_eq!(metrics.model, "test-model");
        assert!(metrics.first_token_ms.is_some());
    }

    #[tokio::test]
    async fn test_low_confidence_item_is_not_forwarded() {
        let provider = scripted(true, stream::iter(vec![text(BLURRY)]));
        let updates: Vec<_> = orchestrator(provider)
            .analyze(ImagePayload::new("AAAA"))
            .unwrap()
            .collect()
            .await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(&updates[0], StreamUpdate::Complete(m) if m.item_count == 0));
    }

    #[tokio::test]
    async fn test_mid_stream_auth_failure_yields_single_error() {
        let provider = scripted(
            true,
            stream::iter(vec![
                text(MUG),
                Err(VisionError::ProviderAuth("key revoked".to_string())),
                text(MUG),
            ]),
        );
        let updates: Vec<_> = orchestrator(provider)
            .analyze(ImagePayload::new("AAAA"))
            .unwrap()
            .collect()
            .await;

        assert_eq!(updates.len(), 2);
        assert!(matches!(updates[0], StreamUpdate::Item(_)));
        assert!(matches!(&updates[1], StreamUpdate::Error(err) if err.code() == "AUTH_ERROR"));
        assert_eq!(updates.iter().filter(|u| u.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_open_failure_is_terminal_error() {
        let mut provider = mock_provider(true);
        provider
            .expect_stream()
            .return_once(|_| Err(VisionError::RateLimited("slow down".to_string())));

        let updates: Vec<_> = orchestrator(Arc::new(provider))
            .analyze(ImagePayload::new("AAAA"))
            .unwrap()
            .collect()
            .await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], StreamUpdate::Error(VisionError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_ranking_cap_stops_consuming_early() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polled);
        let lines: Vec<_> = (0..12).map(|i| text(&ranking_line(i, i % 10 + 1))).collect();
        let provider = scripted(
            true,
            stream::iter(lines).inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let updates: Vec<_> = orchestrator(provider)
            .rank(job(12))
            .unwrap()
            .collect()
            .await;

        let rankings = updates
            .iter()
            .filter(|u| matches!(u, StreamUpdate::Ranking(_)))
            .count();
        assert_eq!(rankings, 10);
        assert_eq!(polled.load(Ordering::SeqCst), 10);
        assert!(matches!(updates.last(), Some(StreamUpdate::Complete(m)) if m.item_count == 10));
    }

    #[tokio::test]
    async fn test_ranking_flush_forwards_trailing_line() {
        let provider = scripted(
            true,
            stream::iter(vec![
                text(&ranking_line(1, 1)),
                text("{\"id\":\"c2\",\"similarityScore\":40,\"rank\":2}"),
            ]),
        );

        let updates: Vec<_> = orchestrator(provider)
            .rank(job(2))
            .unwrap()
            .collect()
            .await;

        let ids: Vec<_> = updates
            .iter()
            .filter_map(|u| match u {
                StreamUpdate::Ranking(c) => Some(c.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(matches!(updates.last(), Some(StreamUpdate::Complete(_))));
    }

    #[tokio::test]
    async fn test_flush_respects_cap() {
        let mut body: String = (0..10).map(|i| ranking_line(i, i + 1)).collect();
        body.push_str("{\"id\":\"extra\",\"similarityScore\":1,\"rank\":10}");
        // Ten complete lines plus a trailing one arrive in a single fragment.
        let provider = scripted(true, stream::iter(vec![text(&body)]));

        let updates: Vec<_> = orchestrator(provider)
            .rank(job(11))
            .unwrap()
            .collect()
            .await;
        assert!(matches!(updates.last(), Some(StreamUpdate::Complete(m)) if m.item_count == 10));
    }

    #[tokio::test]
    async fn test_ranking_rejected_without_capability() {
        let mut provider = mock_provider(false);
        provider.expect_stream().never();
        let mut usage = MockUsageRecorder::new();
        usage.expect_record().never();

        let orchestrator = VisionOrchestrator::new(
            Arc::new(provider),
            Arc::new(usage),
            OrchestratorConfig::default(),
        );
        let err = orchestrator.rank(job(1)).err().unwrap();
        assert!(matches!(err, VisionError::RankingUnsupported(ProviderKind::OpenAi)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_stream() {
        let mut provider = MockTokenStreamProvider::new();
        provider
            .expect_ensure_configured()
            .returning(|| Err(VisionError::Config("GEMINI_API_KEY is not set".to_string())));
        provider.expect_stream().never();

        let err = orchestrator(Arc::new(provider))
            .analyze(ImagePayload::new("AAAA"))
            .err()
            .unwrap();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_consumption() {
        let provider = scripted(
            true,
            stream::iter(vec![text(MUG)]).chain(stream::pending()),
        );
        let orchestrator = VisionOrchestrator::new(
            provider,
            Arc::new(InMemoryUsageRecorder::new()),
            OrchestratorConfig {
                deadline: Some(Duration::from_secs(5)),
                ..OrchestratorConfig::default()
            },
        );

        let updates: Vec<_> = orchestrator
            .analyze(ImagePayload::new("AAAA"))
            .unwrap()
            .collect()
            .await;

        assert_eq!(updates.len(), 2);
        assert!(matches!(updates[0], StreamUpdate::Item(_)));
        assert!(matches!(updates[1], StreamUpdate::Error(VisionError::Timeout)));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_updates_releases_provider_stream() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(Arc::clone(&released));
        let provider = scripted(
            true,
            stream::iter(vec![text(MUG)])
                .chain(stream::pending())
                .map(move |chunk| {
                    let _held = &flag;
                    chunk
                }),
        );

        let mut updates = orchestrator(provider)
            .analyze(ImagePayload::new("AAAA"))
            .unwrap();
        assert!(matches!(updates.next().await, Some(StreamUpdate::Item(_))));
        assert!(!released.load(Ordering::SeqCst));

        drop(updates);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_usage_counters_follow_outcome() {
        let recorder = Arc::new(InMemoryUsageRecorder::new());
        let provider = scripted(
            true,
            stream::iter(vec![text(MUG), Err(VisionError::Timeout)]),
        );
        let orchestrator = VisionOrchestrator::new(
            provider,
            recorder.clone(),
            OrchestratorConfig::default(),
        );
        let _: Vec<_> = orchestrator
            .analyze(ImagePayload::new("AAAA"))
            .unwrap()
            .collect()
            .await;

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.analysis_started, 1);
        assert_eq!(snapshot.stream_failed, 1);
        assert_eq!(snapshot.stream_completed, 0);
        assert_eq!(snapshot.items_emitted, 1);
    }
}
