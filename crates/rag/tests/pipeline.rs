//! The configured retrieval pipeline against a fake memory server, a fake
//! reranker, and a scripted language model.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use recall_common::{ChatTurn, RecallError, Result};
use recall_llm::{LlmClient, LlmRequest, LlmResponse};
use recall_rag::{Query, RecallConfig};
use serde_json::{Value, json};

#[derive(Default)]
struct FakeServer {
    searches: Vec<Value>,
    /// Searches stall well past any client deadline when set.
    stalled: bool,
    /// Knowledge base answers with 500 when set.
    knowledge_base_down: bool,
    /// Every search returns nothing when set.
    empty: bool,
}

type Shared = Arc<Mutex<FakeServer>>;

async fn search(
    State(state): State<Shared>,
    Json(body): Json<Value>,
) -> std::result::Result<Json<Value>, StatusCode> {
    let stalled = {
        let mut state = state.lock().unwrap();
        state.searches.push(body.clone());
        state.stalled
    };
    if stalled {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
    let state = state.lock().unwrap();

    if state.empty {
        return Ok(Json(json!({ "memories": [] })));
    }
    if body.get("user_id").is_some() {
        return Ok(Json(json!({
            "memories": [
                {"text": "User prefers window seats", "dist": 0.1},
                {"text": "User is vegetarian", "dist": 0.4}
            ]
        })));
    }
    if state.knowledge_base_down {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({
        "memories": [
            {"text": "Window seats are on the A and F side", "dist": 0.2},
            {"text": "user prefers   WINDOW seats", "dist": 0.3}
        ]
    })))
}

/// Scores a text 0.95 if it mentions "window", otherwise 0.3.
async fn rerank(Json(body): Json<Value>) -> Json<Value> {
    let hits: Vec<Value> = body["texts"]
        .as_array()
        .unwrap()
        .iter()
        .enumerate()
        .map(|(index, text)| {
            let score = if text.as_str().unwrap().to_lowercase().contains("window") {
                0.95
            } else {
                0.3
            };
            json!({"index": index, "score": score})
        })
        .collect();
    Json(Value::Array(hits))
}

async fn start_fake_server(state: Shared) -> String {
    let router = Router::new()
        .route("/v1/long-term-memory/search", post(search))
        .route("/rerank", post(rerank))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Answers routing prompts with `route_answer` and compression prompts with
/// `rewrite`, counting calls.
struct ScriptedLlm {
    route_answer: &'static str,
    rewrite: &'static str,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(route_answer: &'static str, rewrite: &'static str) -> Arc<Self> {
        Arc::new(Self {
            route_answer,
            rewrite,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let prompt = request.messages[0].content.clone();
        let content = if prompt.contains("Data sources:") {
            self.route_answer
        } else if prompt.contains("Standalone query:") {
            self.rewrite
        } else {
            return Err(RecallError::model("unexpected prompt"));
        };
        self.calls.lock().unwrap().push(prompt);
        Ok(LlmResponse {
            content: content.to_string(),
            model: "scripted".into(),
            usage: None,
            finish_reason: Some("stop".into()),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn config(base: &str, retrieval: &str) -> RecallConfig {
    let toml = format!(
        "[memory_server]\nbase_url = \"{base}\"\n\n[retrieval]\n{retrieval}\n"
    );
    toml::from_str(&toml).unwrap()
}

fn texts(contents: &[recall_rag::Content]) -> Vec<&str> {
    contents.iter().map(|c| c.text.as_str()).collect()
}

#[tokio::test]
async fn test_static_routing_queries_both_sources_with_explicit_identity() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state.clone()).await;
    let llm = ScriptedLlm::new("", "");
    let augmentor = config(&base, "").build_augmentor(llm.clone()).unwrap();

    let result = augmentor
        .augment(&Query::new("where do I sit", "alice"), "Where do I sit?")
        .await
        .unwrap();

    // The duplicate knowledge-base fact collapses into the user fact's slot.
    assert_eq!(
        texts(&result.contents),
        vec![
            "User prefers window seats",
            "User is vegetarian",
            "Window seats are on the A and F side"
        ]
    );
    assert!(result.prompt.starts_with("Where do I sit?\n\n[Context]\nUser prefers window seats"));
    assert!(llm.calls.lock().unwrap().is_empty());

    let searches = state.lock().unwrap().searches.clone();
    assert_eq!(searches.len(), 2);
    let user_search = searches.iter().find(|s| s.get("user_id").is_some()).unwrap();
    assert_eq!(user_search["user_id"], json!({"eq": "alice"}));
    assert_eq!(user_search["text"], "where do I sit");
    let kb_search = searches.iter().find(|s| s.get("user_id").is_none()).unwrap();
    assert_eq!(kb_search["namespace"], json!({"eq": "knowledge-base"}));
}

#[tokio::test]
async fn test_dynamic_routing_follows_the_classifier() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state.clone()).await;
    let llm = ScriptedLlm::new("2", "");
    let augmentor = config(&base, "router = \"dynamic\"")
        .build_augmentor(llm.clone())
        .unwrap();

    let result = augmentor
        .augment(&Query::new("which side are window seats", "alice"), "q")
        .await
        .unwrap();

    assert_eq!(result.contents.len(), 2);
    assert!(result.contents.iter().all(|c| c.source == "knowledge-base"));
    let searches = state.lock().unwrap().searches.clone();
    assert_eq!(searches.len(), 1);
    assert!(searches[0].get("user_id").is_none());

    let calls = llm.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("User specific memories like preferences"));
}

#[tokio::test]
async fn test_inconclusive_classification_routes_to_all() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state.clone()).await;
    let llm = ScriptedLlm::new("I am not sure.", "");
    let augmentor = config(&base, "router = \"dynamic\"").build_augmentor(llm).unwrap();

    augmentor
        .augment(&Query::new("hmm", "alice"), "hmm")
        .await
        .unwrap();
    assert_eq!(state.lock().unwrap().searches.len(), 2);
}

#[tokio::test]
async fn test_inconclusive_classification_can_skip_retrieval() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state.clone()).await;
    let llm = ScriptedLlm::new("", "");
    let augmentor = config(&base, "router = \"dynamic\"\nfallback = \"do_not_route\"")
        .build_augmentor(llm)
        .unwrap();

    let result = augmentor
        .augment(&Query::new("hmm", "alice"), "hmm")
        .await
        .unwrap();
    assert!(result.contents.is_empty());
    assert_eq!(result.prompt, "hmm\n\n[Context]\n");
    assert!(state.lock().unwrap().searches.is_empty());
}

#[tokio::test]
async fn test_reranking_drops_low_scores_and_orders_the_rest() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state.clone()).await;
    let retrieval = format!("[retrieval.rerank]\nbase_url = \"{base}\"\nmin_score = 0.8");
    let augmentor = config(&base, &retrieval)
        .build_augmentor(ScriptedLlm::new("", ""))
        .unwrap();

    let result = augmentor
        .augment(&Query::new("seats", "alice"), "seats")
        .await
        .unwrap();

    assert_eq!(
        texts(&result.contents),
        vec!["User prefers window seats", "Window seats are on the A and F side"]
    );
    assert!(result.contents.iter().all(|c| c.score == Some(0.95)));
}

#[tokio::test]
async fn test_compression_rewrites_the_search_text() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state.clone()).await;
    let llm = ScriptedLlm::new("", "seat preference of alice");
    let augmentor = config(&base, "compress_query = true")
        .build_augmentor(llm.clone())
        .unwrap();

    let query = Query::new("and what about that?", "alice").with_history(vec![
        ChatTurn::user("Do you remember my seat preference?"),
        ChatTurn::assistant("Let me check."),
    ]);
    let result = augmentor.augment(&query, "and what about that?").await.unwrap();

    assert_eq!(result.query.text, "seat preference of alice");
    assert!(result.prompt.starts_with("and what about that?\n"));
    let searches = state.lock().unwrap().searches.clone();
    assert!(searches.iter().all(|s| s["text"] == "seat preference of alice"));
    assert!(llm.calls.lock().unwrap()[0].contains("AI: Let me check."));
}

#[tokio::test]
async fn test_failing_source_aborts_the_request() {
    let state: Shared = Arc::new(Mutex::new(FakeServer {
        knowledge_base_down: true,
        ..Default::default()
    }));
    let base = start_fake_server(state).await;
    let augmentor = config(&base, "").build_augmentor(ScriptedLlm::new("", "")).unwrap();

    let err = augmentor
        .augment(&Query::new("seats", "alice"), "seats")
        .await
        .unwrap_err();
    assert!(
        matches!(err, RecallError::Retrieval { ref retriever, .. } if retriever == "knowledge-base"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_no_results_still_render_a_prompt() {
    let state: Shared = Arc::new(Mutex::new(FakeServer {
        empty: true,
        ..Default::default()
    }));
    let base = start_fake_server(state).await;
    let augmentor = config(&base, "").build_augmentor(ScriptedLlm::new("", "")).unwrap();

    let result = augmentor
        .augment(&Query::new("anything", "alice"), "anything")
        .await
        .unwrap();
    assert!(result.contents.is_empty());
    assert_eq!(result.prompt, "anything\n\n[Context]\n");
}

#[tokio::test]
async fn test_missing_user_id_fails_user_scoped_retrieval() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state).await;
    let augmentor = config(&base, "").build_augmentor(ScriptedLlm::new("", "")).unwrap();

    let err = augmentor
        .augment(&Query::new("seats", " "), "seats")
        .await
        .unwrap_err();
    assert!(matches!(err, RecallError::Retrieval { ref retriever, .. } if retriever == "user-memory"));
}

#[tokio::test]
async fn test_search_past_the_deadline_fails_the_request() {
    let state: Shared = Arc::new(Mutex::new(FakeServer {
        stalled: true,
        ..Default::default()
    }));
    let base = start_fake_server(state).await;
    let toml = format!("[memory_server]\nbase_url = \"{base}\"\ntimeout_ms = 200\n");
    let config: RecallConfig = toml::from_str(&toml).unwrap();
    let augmentor = config.build_augmentor(ScriptedLlm::new("", "")).unwrap();

    let err = augmentor
        .augment(&Query::new("seats", "alice"), "seats")
        .await
        .unwrap_err();
    match err {
        RecallError::Retrieval { message, .. } => assert!(message.contains("timed out"), "{message}"),
        other => panic!("expected a retrieval failure, got {other}"),
    }
}

#[tokio::test]
async fn test_reranking_without_a_threshold_keeps_everything() {
    let state: Shared = Arc::default();
    let base = start_fake_server(state.clone()).await;
    let retrieval = format!("[retrieval.rerank]\nbase_url = \"{base}\"\nmin_score = -inf");
    let augmentor = config(&base, &retrieval)
        .build_augmentor(ScriptedLlm::new("", ""))
        .unwrap();

    let result = augmentor
        .augment(&Query::new("seats", "alice"), "seats")
        .await
        .unwrap();

    // Window facts score 0.95 and sort ahead of the 0.3 vegetarian fact.
    assert_eq!(
        texts(&result.contents),
        vec![
            "User prefers window seats",
            "Window seats are on the A and F side",
            "User is vegetarian"
        ]
    );
}
