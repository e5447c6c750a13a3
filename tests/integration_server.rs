#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// HTTP endpoint tests against a real listener
use rag_qa::config::Config;
use rag_qa::documents::StaticText;
use rag_qa::embeddings::HashingEmbedder;
use rag_qa::indexer::SharedIndex;
use rag_qa::llm::AnswerGenerator;
use rag_qa::pipeline::QaService;
use rag_qa::server::serve_on;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CORPUS: &str = "Coursevita courses include live classes, recorded lessons and projects. \
    Mentors are industry experts. Refunds are possible within seven days. \
    Placement support covers resume reviews and mock interviews.";

struct Running {
    base_url: String,
    service: Arc<QaService>,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<rag_qa::Result<()>>,
    _temp_dir: TempDir,
}

async fn start(llm_url: &str, api_key: &str) -> Running {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::default();
    config.index.path = temp_dir.path().join("index");
    config.chunking.chunk_size = 70;
    config.chunking.chunk_overlap = 10;
    config.llm.base_url = llm_url.to_string();
    config.llm.api_key = Some(api_key.to_string());
    config.llm.timeout_secs = 5;

    let index = Arc::new(SharedIndex::with_embedder(
        &config,
        Arc::new(StaticText::new(CORPUS)),
        Arc::new(HashingEmbedder::new(128)),
    ));
    let generator = AnswerGenerator::from_config(&config.llm).expect("should create generator");
    let service = Arc::new(QaService::new(index, generator, config.index.top_k));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind listener");
    let address = listener.local_addr().expect("listener has address");
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve_on(listener, Arc::clone(&service), async move {
        let _ = shutdown_rx.await;
    }));

    Running {
        base_url: format!("http://{}", address),
        service,
        shutdown,
        handle,
        _temp_dir: temp_dir,
    }
}

async fn post_question(url: String, question: &str) -> (u16, Value) {
    let body = json!({ "question": question }).to_string();
    tokio::task::spawn_blocking(move || {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        let mut response = agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(&body)
            .expect("request should complete");
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .expect("body should be readable");
        (
            status,
            serde_json::from_str(&text).expect("response body is json"),
        )
    })
    .await
    .expect("client task should join")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_share_one_build() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Industry experts." } }]
        })))
        .mount(&llm)
        .await;
    let running = start(&llm.uri(), "good-key").await;

    let url = format!("{}/ask", running.base_url);
    let requests: Vec<_> = (0..6)
        .map(|i| {
            let url = url.clone();
            tokio::spawn(async move { post_question(url, &format!("Who mentors? #{i}")).await })
        })
        .collect();

    for request in requests {
        let (status, body) = request.await.expect("request task should join");
        assert_eq!(status, 200);
        assert_eq!(body["answer"], "Industry experts.");
    }

    assert_eq!(running.service.index().build_count(), 1);

    let _ = running.shutdown.send(());
    running
        .handle
        .await
        .expect("server task should join")
        .expect("server should stop cleanly");
}

#[tokio::test]
async fn rejected_api_key_surfaces_as_500() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid API Key", "type": "invalid_request_error" }
        })))
        .mount(&llm)
        .await;
    let running = start(&llm.uri(), "revoked-key").await;

    let (status, body) =
        post_question(format!("{}/ask", running.base_url), "What is Coursevita?").await;

    assert_eq!(status, 500);
    let detail = body["detail"].as_str().expect("detail is a string");
    assert!(detail.contains("authentication failed"), "{detail}");
    assert!(detail.contains("Invalid API Key"), "{detail}");

    let _ = running.shutdown.send(());
    running
        .handle
        .await
        .expect("server task should join")
        .expect("server should stop cleanly");
}
