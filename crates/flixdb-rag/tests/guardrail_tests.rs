mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{StaticEmbedder, DIM};
use flixdb_core::math::cosine_distance;
use flixdb_core::traits::Embedder;
use flixdb_embed::HashingEmbedder;
use flixdb_rag::router::SUPPORT_TOPIC;
use flixdb_rag::{GuardrailPipeline, PiiDetector, PiiKind, RouterTopic, SemanticRouter};

async fn support_router() -> SemanticRouter {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
    SemanticRouter::build(vec![RouterTopic::streamflix_support(0.5)], embedder, Duration::from_secs(5)).await.unwrap()
}

#[tokio::test]
async fn support_questions_are_admitted() {
    let router = support_router().await;
    for q in ["How do I reset my password?", "I forgot my password", "Video keeps buffering", "roku", "refund"] {
        let decision = router.route(q).await.unwrap();
        assert!(decision.admitted, "{q} at {}", decision.distance);
        assert_eq!(decision.topic.as_deref(), Some(SUPPORT_TOPIC));
    }
}

#[tokio::test]
async fn unrelated_questions_are_rejected() {
    let router = support_router().await;
    for q in ["What's the weather?", "Give me a pasta recipe", "Who won the football game yesterday"] {
        let decision = router.route(q).await.unwrap();
        assert!(!decision.admitted, "{q} at {}", decision.distance);
        assert!(decision.topic.is_none());
        assert!(decision.distance > 0.5);
    }
}

fn two_d() -> Arc<StaticEmbedder> {
    Arc::new(StaticEmbedder::new(&[("billing", vec![1.0, 0.0]), ("refund", vec![1.0, 0.0]), ("near", vec![0.6, 0.8])]))
}

#[tokio::test]
async fn router_threshold_is_inclusive() {
    let d = cosine_distance(&[0.6, 0.8], &[1.0, 0.0]);

    let at = SemanticRouter::build(vec![RouterTopic::new("billing", &["billing"], d)], two_d(), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(at.route_embedding(&[0.6, 0.8]).admitted);

    let below = f32::from_bits(d.to_bits() - 1);
    let beyond =
        SemanticRouter::build(vec![RouterTopic::new("billing", &["billing"], below)], two_d(), Duration::from_secs(1))
            .await
            .unwrap();
    let decision = beyond.route_embedding(&[0.6, 0.8]);
    assert!(!decision.admitted);
    assert_eq!(decision.distance, d);
}

#[tokio::test]
async fn earlier_topic_wins_ties() {
    let topics = vec![RouterTopic::new("billing", &["billing"], 0.5), RouterTopic::new("refunds", &["refund"], 0.5)];
    let router = SemanticRouter::build(topics, two_d(), Duration::from_secs(1)).await.unwrap();
    assert_eq!(router.route_embedding(&[1.0, 0.0]).topic.as_deref(), Some("billing"));
}

#[tokio::test]
async fn router_needs_exemplars() {
    let err = SemanticRouter::build(vec![], two_d(), Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_config");
}

#[tokio::test]
async fn pii_scan_runs_on_blocked_and_admitted_queries() {
    let embedder = HashingEmbedder::new(DIM);
    let pipeline = GuardrailPipeline::new(support_router().await, PiiDetector::new().unwrap());

    let off_topic = "What's the weather? call me at 555-123-4567";
    let blocked = pipeline.evaluate(off_topic, &embedder.embed_text(off_topic));
    assert!(blocked.blocked);
    assert!(blocked.reason.is_some());
    assert_eq!(blocked.findings.iter().map(|f| f.kind).collect::<Vec<_>>(), vec![PiiKind::PhoneUs]);

    let on_topic = "I forgot my password";
    let admitted = pipeline.evaluate(on_topic, &embedder.embed_text(on_topic));
    assert!(!admitted.blocked);
    assert!(admitted.reason.is_none());
    assert!(!admitted.has_pii());
}
