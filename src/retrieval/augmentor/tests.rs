use std::sync::Arc;

use super::*;
use crate::documents::Document;
use crate::retrieval::SourceId;
use crate::retrieval::router::QueryRouter;
use crate::retrieval::router::RoutingStrategy;
use crate::test_support::{RecordingObserver, StaticSource};

fn augmentor() -> (Augmentor, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    (
        Augmentor::new(observer.clone(), Duration::from_millis(200)),
        observer,
    )
}

async fn fan_out(sources: &[SharedSource]) -> RoutingDecision {
    let router = QueryRouter::new(
        RoutingStrategy::MultiSourceFanOut,
        sources.to_vec(),
        None,
        Arc::new(RecordingObserver::default()),
        Duration::from_secs(1),
    )
    .expect("router should be valid");
    router.route("query", &[]).await
}

#[tokio::test]
async fn merges_in_registration_then_rank_order() {
    let sources: Vec<SharedSource> = vec![
        StaticSource::with_texts("docs", &["doc one", "doc two"], 0.7),
        StaticSource::with_texts("web", &["web one"], 0.99),
    ];
    let decision = fan_out(&sources).await;
    let (augmentor, _) = augmentor();

    let prompt = augmentor.augment("question", &decision, &sources, &[]).await;

    let texts: Vec<&str> = prompt.evidence.iter().map(|p| p.segment.text()).collect();
    assert_eq!(texts, vec!["doc one", "doc two", "web one"]);
    assert!(prompt.has_evidence());
}

#[tokio::test]
async fn duplicate_segments_keep_first_occurrence() {
    let shared = Document::new("shared.txt", "the same passage").as_segment();
    let passage = |source: &str, score: f32| RetrievedPassage {
        segment: shared.clone(),
        score,
        source: SourceId::from(source),
    };
    let sources: Vec<SharedSource> = vec![
        StaticSource::with_passages("docs", vec![passage("docs", 0.6)]),
        StaticSource::with_passages("mirror", vec![passage("mirror", 0.9)]),
    ];
    let decision = fan_out(&sources).await;
    let (augmentor, _) = augmentor();

    let prompt = augmentor.augment("question", &decision, &sources, &[]).await;

    assert_eq!(prompt.evidence.len(), 1);
    assert_eq!(prompt.evidence[0].source, SourceId::from("docs"));
}

#[tokio::test]
async fn unselected_sources_are_not_queried() {
    let sources: Vec<SharedSource> = vec![
        StaticSource::with_texts("docs", &["doc"], 0.9),
        StaticSource::failing("web"),
    ];
    let router = QueryRouter::new(
        RoutingStrategy::SingleSource {
            source: SourceId::from("docs"),
        },
        sources.clone(),
        None,
        Arc::new(RecordingObserver::default()),
        Duration::from_secs(1),
    )
    .expect("router should be valid");
    let decision = router.route("q", &[]).await;
    let (augmentor, observer) = augmentor();

    let prompt = augmentor.augment("q", &decision, &sources, &[]).await;

    assert_eq!(prompt.evidence.len(), 1);
    assert!(
        !observer
            .events()
            .iter()
            .any(|e| matches!(e, RagEvent::SourceUnavailable { .. }))
    );
}

#[tokio::test]
async fn failing_source_degrades_to_the_rest() {
    let sources: Vec<SharedSource> = vec![
        StaticSource::failing("web"),
        StaticSource::with_texts("docs", &["still here"], 0.8),
    ];
    let decision = fan_out(&sources).await;
    let (augmentor, observer) = augmentor();

    let prompt = augmentor.augment("question", &decision, &sources, &[]).await;

    assert_eq!(prompt.evidence.len(), 1);
    let events = observer.events();
    assert!(events.iter().any(|e| matches!(
        e,
        RagEvent::SourceUnavailable { source, .. } if source.as_str() == "web"
    )));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, RagEvent::AllSourcesFailed { .. }))
    );
}

#[tokio::test]
async fn all_sources_failing_passes_query_through() {
    let sources: Vec<SharedSource> = vec![StaticSource::failing("web"), StaticSource::hanging("slow")];
    let decision = fan_out(&sources).await;
    let (augmentor, observer) = augmentor();

    let prompt = augmentor
        .augment("What is the capital of France?", &decision, &sources, &[])
        .await;

    assert!(!prompt.has_evidence());
    assert_eq!(prompt.render(), "What is the capital of France?");
    assert!(
        observer
            .events()
            .iter()
            .any(|e| matches!(e, RagEvent::AllSourcesFailed { attempted: 2 }))
    );
}

#[tokio::test]
async fn empty_decision_is_pass_through() {
    let sources: Vec<SharedSource> = vec![StaticSource::with_texts("docs", &["doc"], 0.9)];
    let (augmentor, observer) = augmentor();

    let prompt = augmentor
        .augment("hello", &RoutingDecision::none(), &sources, &[])
        .await;

    assert_eq!(prompt.render(), "hello");
    assert!(
        !observer
            .events()
            .iter()
            .any(|e| matches!(e, RagEvent::AllSourcesFailed { .. }))
    );
}

#[tokio::test]
async fn rendered_sections_follow_fixed_order() {
    let sources: Vec<SharedSource> = vec![StaticSource::with_texts("docs", &["Paris is in France."], 0.9)];
    let decision = fan_out(&sources).await;
    let (augmentor, _) = augmentor();
    let augmentor = augmentor.with_system_instructions("Answer briefly.");

    let earlier = ConversationTurn::user("Hi there");
    let reply = ConversationTurn::assistant("Hello!");
    let prompt = augmentor
        .augment("Where is Paris?", &decision, &sources, &[&earlier, &reply])
        .await;
    let rendered = prompt.render();

    let system = rendered.find("Answer briefly.").expect("system section");
    let evidence = rendered.find("[1] (docs) Paris is in France.").expect("evidence section");
    let history = rendered.find("User: Hi there").expect("history section");
    let query = rendered.find("Question: Where is Paris?").expect("query section");
    assert!(system < evidence && evidence < history && history < query);
    assert!(rendered.ends_with("Question: Where is Paris?"));
}

#[test]
fn history_without_evidence_has_no_context_section() {
    let prompt = AugmentedPrompt {
        system: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        evidence: Vec::new(),
        history: vec![ConversationTurn::user("earlier")],
        query: "now".to_string(),
    };

    let rendered = prompt.render();

    assert!(!rendered.contains("Context:"));
    assert!(!rendered.contains(DEFAULT_SYSTEM_INSTRUCTIONS));
    assert!(rendered.starts_with("Conversation so far:\nUser: earlier"));
    assert!(rendered.ends_with("Question: now"));
}
