//! HTTP API tests against a real listener.
//!
//! The server runs with a plain-text "PDF" extractor, the hashed-trigram
//! embedder and a scripted chat model, so no network access or API key is
//! needed.

use async_trait::async_trait;
use pdf_qa::assistant::Assistant;
use pdf_qa::config::Config;
use pdf_qa::embedding::HashEmbedder;
use pdf_qa::error::QaError;
use pdf_qa::extract::{PageText, PdfTextExtractor};
use pdf_qa::llm::ChatModel;
use pdf_qa::server::{router, AppState};
use pdf_qa::session::InMemorySessionStore;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reads the bytes as UTF-8 text; `!broken` documents fail to open.
struct TextExtractor;

impl PdfTextExtractor for TextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, QaError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text.starts_with("!broken") {
            return Err(QaError::Extraction("not a PDF".to_string()));
        }
        Ok(vec![PageText {
            number: 1,
            text: Ok(text),
        }])
    }
}

/// Answers "answer N"; fails on prompts containing `explode` and stalls on
/// prompts containing `slowly`.
#[derive(Default)]
struct ScriptedChat {
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, QaError> {
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if prompt.contains("explode") {
            return Err(QaError::Llm("503 Service Unavailable".to_string()));
        }
        if prompt.contains("slowly") {
            tokio::time::sleep(Duration::from_millis(1500)).await;
        }
        Ok(format!("answer {}", n))
    }
}

fn test_config() -> Config {
    let mut config = Config::minimal();
    config.extraction.document_separators = false;
    config.llm.condense_question = false;
    config.llm.api_key_env = Some("PDFQA_IT_UNSET_API_KEY".to_string());
    config
}

async fn spawn_server(config: Config) -> (String, Arc<ScriptedChat>) {
    let chat = Arc::new(ScriptedChat::default());
    let assistant = Assistant::new(
        &config,
        Arc::new(TextExtractor),
        Arc::new(HashEmbedder::default()),
        chat.clone(),
    );
    let state = AppState::new(config, assistant, Arc::new(InMemorySessionStore::new()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    (format!("http://{}", addr), chat)
}

fn pdf_part(name: &str, body: &str) -> Part {
    Part::bytes(body.as_bytes().to_vec()).file_name(name.to_string())
}

async fn upload(base: &str, session_id: &str, files: &[(&str, &str)]) -> (StatusCode, Value) {
    let mut form = Form::new().text("session_id", session_id.to_string());
    for (name, body) in files {
        form = form.part("files", pdf_part(name, body));
    }
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

async fn query(base: &str, body: Value) -> (StatusCode, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/query", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

async fn ask(base: &str, session_id: &str, question: &str) -> (StatusCode, Value) {
    query(base, json!({ "question": question, "session_id": session_id })).await
}

async fn delete_session(base: &str, session_id: &str) -> (StatusCode, Value) {
    let resp = reqwest::Client::new()
        .delete(format!("{}/session/{}", base, session_id))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

// ============ health / root ============

#[tokio::test]
async fn health_reports_version_and_missing_key() {
    let (base, _) = spawn_server(test_config()).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["api_key_configured"], false);
}

#[tokio::test]
async fn root_lists_endpoints() {
    let (base, _) = spawn_server(test_config()).await;
    let body: Value = reqwest::get(&base).await.unwrap().json().await.unwrap();
    assert_eq!(body["health"], "/health");
    assert!(body["docs"].as_array().unwrap().len() >= 3);
}

// ============ upload ============

#[tokio::test]
async fn upload_without_files_is_bad_request() {
    let (base, _) = spawn_server(test_config()).await;
    let (status, body) = upload(&base, "s1", &[]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "No files provided");
}

#[tokio::test]
async fn upload_rejects_non_pdf_names() {
    let (base, _) = spawn_server(test_config()).await;
    let (status, body) = upload(&base, "s1", &[("a.pdf", "fine"), ("notes.docx", "nope")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("notes.docx"));
}

#[tokio::test]
async fn upload_requires_session_id() {
    let (base, _) = spawn_server(test_config()).await;
    let form = Form::new().part("files", pdf_part("a.pdf", "text"));
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("session_id"));
}

#[tokio::test]
async fn upload_with_no_extractable_text_is_bad_request() {
    let (base, _) = spawn_server(test_config()).await;
    let (status, body) = upload(&base, "s1", &[("a.pdf", "!broken"), ("b.pdf", "   ")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn upload_reports_chunks_and_skipped_files() {
    let (base, _) = spawn_server(test_config()).await;
    let (status, body) = upload(
        &base,
        "s1",
        &[
            ("sky.pdf", "The sky is blue. Grass is green."),
            ("bad.pdf", "!broken"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["chunks_count"], 1);
    assert_eq!(body["message"], "Successfully processed 2 PDF file(s)");
    assert_eq!(body["skipped"][0]["name"], "bad.pdf");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let mut config = test_config();
    config.server.max_upload_bytes = 1024;
    let (base, _) = spawn_server(config).await;

    let big = "x".repeat(4096);
    let form = Form::new()
        .text("session_id", "s1")
        .part("files", pdf_part("big.pdf", &big));
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ============ query ============

#[tokio::test]
async fn query_unknown_session_is_not_found() {
    let (base, _) = spawn_server(test_config()).await;
    let (status, body) = ask(&base, "x", "Anything?").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn blank_question_is_bad_request() {
    let (base, _) = spawn_server(test_config()).await;
    upload(&base, "s1", &[("a.pdf", "Some text.")]).await;
    let (status, body) = ask(&base, "s1", "  ").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Question cannot be empty");
}

#[tokio::test]
async fn malformed_query_body_is_bad_request() {
    let (base, _) = spawn_server(test_config()).await;
    let (status, body) = query(&base, json!({ "session_id": "s1" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn upload_query_delete_roundtrip() {
    let (base, chat) = spawn_server(test_config()).await;
    let (status, _) = upload(&base, "s1", &[("sky.pdf", "The sky is blue. Grass is green.")]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = ask(&base, "s1", "What color is the sky?").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "answer 1");
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["sources"][0]["chunk_index"], 0);
    assert_eq!(body["sources"][0]["text"], "The sky is blue. Grass is green.");

    let prompt = &chat.prompts()[0];
    assert!(prompt.contains("The sky is blue. Grass is green."));
    assert!(prompt.contains("What color is the sky?"));

    let (status, body) = delete_session(&base, "s1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Session s1 deleted");

    let (status, _) = ask(&base, "s1", "What color is the sky?").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = delete_session(&base, "s1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_accumulates_within_a_session() {
    let (base, chat) = spawn_server(test_config()).await;
    upload(&base, "s1", &[("a.pdf", "Alpha facts.")]).await;

    ask(&base, "s1", "First question?").await;
    ask(&base, "s1", "Second question?").await;

    let prompts = chat.prompts();
    assert!(!prompts[0].contains("User: "));
    assert!(prompts[1].contains("User: First question?\nAssistant: answer 1"));
}

#[tokio::test]
async fn reupload_replaces_index_and_history() {
    let (base, chat) = spawn_server(test_config()).await;
    upload(&base, "s1", &[("a.pdf", "Alpha document about apples.")]).await;
    ask(&base, "s1", "What fruit?").await;

    let (status, _) = upload(&base, "s1", &[("b.pdf", "Beta document about bananas.")]).await;
    assert_eq!(status, StatusCode::OK);
    ask(&base, "s1", "What fruit now?").await;

    let prompts = chat.prompts();
    let last = prompts.last().unwrap();
    assert!(last.contains("bananas"));
    assert!(!last.contains("apples"));
    assert!(!last.contains("User: "));
}

#[tokio::test]
async fn sessions_are_isolated() {
    let (base, chat) = spawn_server(test_config()).await;
    upload(&base, "a", &[("a.pdf", "Apples grow on trees.")]).await;
    upload(&base, "b", &[("b.pdf", "Bananas grow in bunches.")]).await;

    ask(&base, "a", "Tell me about fruit").await;
    ask(&base, "b", "Tell me about fruit").await;

    let prompts = chat.prompts();
    assert!(prompts[0].contains("Apples") && !prompts[0].contains("Bananas"));
    assert!(prompts[1].contains("Bananas") && !prompts[1].contains("Apples"));
    assert!(!prompts[1].contains("User: "));
}

#[tokio::test]
async fn supplied_history_seeds_an_empty_session() {
    let (base, chat) = spawn_server(test_config()).await;
    upload(&base, "s1", &[("a.pdf", "Some text.")]).await;

    let history = json!([
        { "role": "user", "content": "Earlier question" },
        { "role": "assistant", "content": "Earlier answer" }
    ]);
    let (status, _) = query(
        &base,
        json!({ "question": "Next?", "session_id": "s1", "chat_history": history }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(chat.prompts()[0].contains("User: Earlier question\nAssistant: Earlier answer"));

    // Once the session has turns of its own, supplied history is ignored.
    query(
        &base,
        json!({
            "question": "Again?",
            "session_id": "s1",
            "chat_history": [{ "role": "user", "content": "Ignored turn" }]
        }),
    )
    .await;
    let last = chat.prompts().pop().unwrap();
    assert!(!last.contains("Ignored turn"));
    assert!(last.contains("User: Next?"));
}

#[tokio::test]
async fn llm_failure_is_bad_gateway() {
    let (base, _) = spawn_server(test_config()).await;
    upload(&base, "s1", &[("a.pdf", "Some text.")]).await;

    let (status, body) = ask(&base, "s1", "Please explode").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn saturated_server_answers_overloaded() {
    let mut config = test_config();
    config.server.max_concurrent_requests = 1;
    config.server.queue_timeout_secs = 0;
    let (base, _) = spawn_server(config).await;
    upload(&base, "a", &[("a.pdf", "Some text.")]).await;
    upload(&base, "b", &[("b.pdf", "Other text.")]).await;

    let slow_base = base.clone();
    let slow = tokio::spawn(async move { ask(&slow_base, "a", "Answer slowly").await });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (status, body) = ask(&base, "b", "Quick one?").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "overloaded");

    let (status, _) = slow.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_query_does_not_keep_supplied_history() {
    let (base, chat) = spawn_server(test_config()).await;
    upload(&base, "s1", &[("a.pdf", "Some text.")]).await;

    let (status, _) = query(
        &base,
        json!({
            "question": "Please explode",
            "session_id": "s1",
            "chat_history": [{ "role": "user", "content": "Seeded turn" }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = ask(&base, "s1", "Next?").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!chat.prompts().pop().unwrap().contains("Seeded turn"));
}

#[tokio::test]
async fn queued_session_queries_leave_slots_for_other_sessions() {
    let mut config = test_config();
    config.server.max_concurrent_requests = 2;
    config.server.queue_timeout_secs = 1;
    let (base, _) = spawn_server(config).await;
    upload(&base, "a", &[("a.pdf", "Some text.")]).await;
    upload(&base, "b", &[("b.pdf", "Other text.")]).await;

    let first_base = base.clone();
    let first = tokio::spawn(async move { ask(&first_base, "a", "Answer slowly").await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    let second_base = base.clone();
    let second = tokio::spawn(async move { ask(&second_base, "a", "And then?").await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, _) = ask(&base, "b", "Quick one?").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(first.await.unwrap().0, StatusCode::OK);
    assert_eq!(second.await.unwrap().0, StatusCode::OK);
}

#[tokio::test]
async fn cors_allows_configured_origin() {
    let (base, _) = spawn_server(test_config()).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/query", base))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
}
