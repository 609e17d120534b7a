//! flixdb-rag
//!
//! Help-center retrieval-augmented generation: topic guardrails, PII
//! detection, the semantic response cache, chat-completion generation and the
//! `HelpCenter` orchestrator tying them to a help-article index.
pub mod cache;
pub mod generator;
pub mod guardrail;
pub mod help;
pub mod pii;
pub mod router;

pub use cache::{CacheHit, CacheStats, MemoryCacheBackend, SemanticCache};
pub use generator::OpenAiGenerator;
pub use guardrail::{GuardrailPipeline, GuardrailResult, OFF_TOPIC_MESSAGE};
pub use help::{ArticleRef, ChatRequest, ChatResponse, HelpCenter, HelpStats, Outcome, SourceFinding};
pub use pii::{PiiDetector, PiiFinding, PiiKind};
pub use router::{RouteDecision, RouterTopic, SemanticRouter};
