use serde::{Deserialize, Serialize};

use crate::pii::{PiiDetector, PiiFinding};
use crate::router::{RouteDecision, SemanticRouter};

pub const OFF_TOPIC_MESSAGE: &str = "I'm StreamFlix's Help Center assistant, and I can only help with StreamFlix-related questions.

Here are some things I can help you with:
- Account issues (password reset, subscription, profiles)
- Playback problems (buffering, quality, audio sync)
- Content questions (availability, downloads, parental controls)
- Device support (smart TVs, mobile apps, casting)
- Billing inquiries (charges, payment methods, refunds)

Please ask a question about StreamFlix, or visit help.streamflix.com for more options.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub findings: Vec<PiiFinding>,
    pub route: RouteDecision,
}

impl GuardrailResult {
    pub fn has_pii(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Router check followed by a PII scan. The scan always runs, including on
/// blocked queries, and never changes the routing verdict.
pub struct GuardrailPipeline {
    router: SemanticRouter,
    pii: PiiDetector,
}

impl GuardrailPipeline {
    pub fn new(router: SemanticRouter, pii: PiiDetector) -> Self {
        Self { router, pii }
    }

    pub fn router(&self) -> &SemanticRouter {
        &self.router
    }

    pub fn pii(&self) -> &PiiDetector {
        &self.pii
    }

    pub fn evaluate(&self, query: &str, embedding: &[f32]) -> GuardrailResult {
        let route = self.router.route_embedding(embedding);
        let findings = self.pii.scan(query);
        if !findings.is_empty() {
            let kinds: Vec<&str> = findings.iter().map(|f| f.kind.as_str()).collect();
            tracing::info!(kinds = ?kinds, "pii detected in query");
        }
        let reason = (!route.admitted).then(|| format!("off-topic (nearest exemplar distance {:.3})", route.distance));
        if let Some(r) = &reason {
            tracing::info!(reason = %r, "query blocked by guardrail");
        }
        GuardrailResult { blocked: !route.admitted, reason, findings, route }
    }
}
