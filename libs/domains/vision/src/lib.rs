//! Vision Domain
//!
//! Streams product recognition and visual-similarity ranking from a generative
//! vision provider to HTTP clients as server-sent events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Handlers   │  ← SSE gateway, session endpoints
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐     ┌──────────────┐
//! │ Orchestrator │ ──► │  Extractors  │  ← incremental object / line parsing
//! └──────┬───────┘     └──────────────┘
//!        │
//! ┌──────▼───────┐     ┌──────────────┐
//! │   Provider   │     │ SessionStore │  ← TTL + capacity bounded
//! └──────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_vision::{
//!     InMemorySessionStore, InMemoryUsageRecorder, OrchestratorConfig, ProviderKind,
//!     VisionOrchestrator, VisionState, handlers, provider::provider_from_env,
//! };
//!
//! let usage = Arc::new(InMemoryUsageRecorder::new());
//! let orchestrator = VisionOrchestrator::new(
//!     provider_from_env(ProviderKind::Gemini),
//!     usage.clone(),
//!     OrchestratorConfig::default(),
//! );
//! let router = handlers::router(VisionState {
//!     orchestrator,
//!     sessions: Arc::new(InMemorySessionStore::default()),
//!     usage,
//! });
//! ```

pub mod error;
pub mod extractor;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod session;
pub mod usage;

// Re-export commonly used types
pub use error::{VisionError, VisionResult};
pub use extractor::{ItemSanitizer, ObjectExtractor, RankingExtractor};
pub use handlers::{ApiDoc, VisionState};
pub use models::{
    AnalyzeRequest, CandidateInput, Demographic, IconCategory, ImagePayload, ItemCategory,
    ProviderCapabilities, ProviderKind, RankRequest, RankedCandidate, RankingJob,
    RecognizedItem, Session, StreamMetrics, TokenUsage,
};
pub use orchestrator::{OrchestratorConfig, StreamUpdate, UpdateStream, VisionOrchestrator};
pub use provider::{GenerationRequest, StreamChunk, TokenStream, TokenStreamProvider};
pub use session::{InMemorySessionStore, SessionStore, SessionStoreConfig};
pub use usage::{InMemoryUsageRecorder, UsageEvent, UsageRecorder, UsageSnapshot};
