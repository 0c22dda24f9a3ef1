//! End-to-end pipeline tests with in-process doubles
//!
//! Synthesis and change requests run against `MockLLMClient` and
//! `MockRepositoryHost`; maps are stored in a `FileStore` under a temp dir.

use featuremap::error::ErrorKind;
use featuremap::features::{FeatureId, SequentialIdentity};
use featuremap::github::{HostOp, MockRepositoryHost, RepoCoordinates, WriteAction};
use featuremap::llm::{BackendError, MockLLMClient, MockResponse, RetryingClient, ToolCall};
use featuremap::pipeline::{
    apply_change_request, load_feature_map, persist, synthesize_feature_map, PipelineConfig,
    PipelineContext,
};
use featuremap::progress::{ProgressEvent, ProgressHandler};
use featuremap::store::FileStore;
use featuremap::tools::Stage;
use featuremap::util::retry::RetryPolicy;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingHandler {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn coords() -> RepoCoordinates {
    RepoCoordinates::new("octo", "shop")
}

fn shop_host() -> MockRepositoryHost {
    MockRepositoryHost::new()
        .with_file(&coords(), "main", "README.md", "# Shop\n")
        .with_file(&coords(), "main", "src/cart.rs", "pub struct Cart;\n")
        .with_file(&coords(), "main", "src/checkout.rs", "pub fn pay() {}\n")
        .with_file(&coords(), "main", "src/search.rs", "pub fn search() {}\n")
}

fn extraction_calls() -> Vec<ToolCall> {
    vec![
        MockLLMClient::add_feature_call("Cart", "Collect items", "Cart struct", &["src/cart.rs"]),
        MockLLMClient::add_feature_call("Checkout", "Pay", "pay()", &["src/checkout.rs"]),
        MockLLMClient::add_feature_call("Search", "Find products", "search()", &["src/search.rs"]),
    ]
}

fn context(llm: Arc<MockLLMClient>, host: MockRepositoryHost) -> PipelineContext {
    PipelineContext::new(llm, Arc::new(host))
        .with_identity(Arc::new(SequentialIdentity::default()))
        .with_config(PipelineConfig::new().with_read_retry(RetryPolicy::none()))
}

#[tokio::test]
async fn test_synthesize_persist_and_reload() {
    let llm = Arc::new(MockLLMClient::new());
    llm.add_response(MockResponse::with_tool_calls(extraction_calls()));
    llm.add_response(MockResponse::with_tool_calls(vec![
        MockLLMClient::link_features_call("feature-1", &["feature-2"]),
        MockLLMClient::link_features_call("feature-3", &["feature-1", "feature-99"]),
    ]));

    let ctx = context(llm, shop_host());
    let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();
    assert_eq!(report.files_analyzed, 4);
    assert_eq!(report.feature_map.len(), 3);

    // Links are undirected and never point at unknown features
    let map = &report.feature_map;
    let cart = map.get(&FeatureId::new("feature-1")).unwrap();
    let checkout = map.get(&FeatureId::new("feature-2")).unwrap();
    let search = map.get(&FeatureId::new("feature-3")).unwrap();
    assert!(cart.neighbors.contains(&checkout.id));
    assert!(checkout.neighbors.contains(&cart.id));
    assert!(search.neighbors.contains(&cart.id));
    assert!(cart.neighbors.contains(&search.id));
    assert!(!search.neighbors.contains(&FeatureId::new("feature-99")));
    assert_eq!(report.warnings.len(), 1);

    let dir = TempDir::new().unwrap();
    persist(&FileStore::new(dir.path()), "alice", map)
        .await
        .unwrap();

    let reopened = FileStore::new(dir.path());
    let loaded = load_feature_map(&reopened, "alice").await.unwrap();
    assert_eq!(&loaded, map);
    assert!(load_feature_map(&reopened, "bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_events_follow_stage_order() {
    let llm = Arc::new(MockLLMClient::new());
    llm.add_response(MockResponse::with_tool_calls(extraction_calls()));
    llm.add_response(MockResponse::text("No relations."));
    let recorder = Arc::new(RecordingHandler::default());

    let ctx = context(llm, shop_host()).with_progress(recorder.clone());
    synthesize_feature_map(&ctx, &coords()).await.unwrap();

    let events = recorder.events();
    assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));

    let stages: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::StageStarted { stage } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![Stage::FeatureExtraction, Stage::FeatureConsolidation]
    );
}

#[tokio::test]
async fn test_malformed_calls_are_dropped_and_batch_continues() {
    let llm = Arc::new(MockLLMClient::new());
    llm.add_response(MockResponse::with_tool_calls(vec![
        MockLLMClient::add_feature_call("Cart", "Collect items", "Cart struct", &["src/cart.rs"]),
        ToolCall::new("add_feature", json!({ "name": "No summaries" })),
        ToolCall::new("delete_everything", json!({})),
    ]));
    llm.add_response(MockResponse::text("Only one feature."));
    let recorder = Arc::new(RecordingHandler::default());

    let ctx = context(llm, shop_host()).with_progress(recorder.clone());
    let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();

    assert_eq!(report.feature_map.len(), 1);
    assert_eq!(report.rejected_tool_calls.len(), 2);
    let rejected_events = recorder
        .events()
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ToolCallRejected { .. }))
        .count();
    assert_eq!(rejected_events, 2);
}

#[tokio::test]
async fn test_change_request_uses_stored_map_and_reports_per_file() {
    let host = shop_host();
    host.interleave_write("src/search.rs", "pub fn search_v2() {}\n");

    let llm = Arc::new(MockLLMClient::new());
    llm.add_response(MockResponse::with_tool_calls(vec![
        MockLLMClient::update_file_call("src/cart.rs", "pub struct Cart { items: Vec<u32> }\n"),
        MockLLMClient::update_file_call("src/search.rs", "pub fn search(q: &str) {}\n"),
        MockLLMClient::add_file_call("src/wishlist.rs", "pub struct Wishlist;\n"),
    ]));

    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path());
    store_map_with_cart(&store).await;
    let feature_map = load_feature_map(&store, "alice").await.unwrap();

    let recorder = Arc::new(RecordingHandler::default());
    let ctx = context(llm.clone(), host.clone()).with_progress(recorder.clone());
    let report = apply_change_request(&ctx, &coords(), "Add a wishlist", &feature_map)
        .await
        .unwrap();

    assert!(report.is_partial());
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.files[0].action, Some(WriteAction::Updated));
    assert_eq!(report.files[2].action, Some(WriteAction::Created));
    let conflict = &report.files[1];
    assert_eq!(conflict.path, "src/search.rs");
    assert_eq!(
        conflict.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::ConcurrencyConflict)
    );

    // The concurrent edit survives
    let search = coords().file("src/search.rs", "main");
    assert_eq!(
        host.file_content(&search).as_deref(),
        Some("pub fn search_v2() {}\n")
    );

    let prompt = &llm.requests()[0].prompt;
    assert!(prompt.contains("Add a wishlist"));
    assert!(prompt.contains("Shopping cart"));

    let events = recorder.events();
    let written = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::FileWritten { .. }))
        .count();
    let failed = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::FileWriteFailed { .. }))
        .count();
    assert_eq!((written, failed), (2, 1));
}

async fn store_map_with_cart(store: &FileStore) {
    let llm = Arc::new(MockLLMClient::new());
    llm.add_response(MockResponse::with_tool_calls(vec![
        MockLLMClient::add_feature_call(
            "Shopping cart",
            "Collect items",
            "Cart struct",
            &["src/cart.rs"],
        ),
    ]));
    llm.add_response(MockResponse::text("Nothing to link."));
    let ctx = context(llm, shop_host());
    let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();
    persist(store, "alice", &report.feature_map).await.unwrap();
}

#[tokio::test]
async fn test_transient_llm_failure_is_retried() {
    let inner = Arc::new(MockLLMClient::new());
    inner.add_response(MockResponse::error(BackendError::NetworkError {
        message: "connection reset".to_string(),
    }));
    inner.add_response(MockResponse::with_tool_calls(extraction_calls()));
    inner.add_response(MockResponse::text("No relations."));

    let policy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let llm = Arc::new(RetryingClient::new(inner.clone(), policy));
    let ctx = PipelineContext::new(llm, Arc::new(shop_host()))
        .with_config(PipelineConfig::new().with_read_retry(RetryPolicy::none()));

    let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();
    assert_eq!(report.feature_map.len(), 3);
    assert_eq!(inner.requests().len(), 3);
}

#[tokio::test]
async fn test_llm_auth_failure_aborts_without_retry() {
    let inner = Arc::new(MockLLMClient::new());
    inner.add_response(MockResponse::error(BackendError::AuthenticationError {
        message: "API key not valid".to_string(),
    }));

    let llm = Arc::new(RetryingClient::new(inner.clone(), RetryPolicy::default()));
    let ctx = PipelineContext::new(llm, Arc::new(shop_host()));

    let err = synthesize_feature_map(&ctx, &coords()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamAuth);
    assert!(!err.kind().is_resubmittable());
    assert_eq!(inner.requests().len(), 1);
}

#[tokio::test]
async fn test_fetch_retries_transient_host_errors() {
    let host = shop_host();
    host.fail_next(
        HostOp::ListFiles,
        featuremap::github::HostError::Unavailable {
            message: "secondary rate limit".to_string(),
            status: Some(429),
        },
    );
    let llm = Arc::new(MockLLMClient::new());
    llm.add_response(MockResponse::text("Nothing here."));

    let policy = RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    };
    let ctx = PipelineContext::new(llm, Arc::new(host.clone()))
        .with_config(PipelineConfig::new().with_read_retry(policy));

    let report = synthesize_feature_map(&ctx, &coords()).await.unwrap();
    assert_eq!(report.files_analyzed, 4);
    assert_eq!(host.call_count(HostOp::ListFiles), 2);
}
