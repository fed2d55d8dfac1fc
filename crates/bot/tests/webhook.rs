mod support;

use std::sync::Arc;

use appointment_bot::commands::{CommandRouter, HELP_TEXT};
use appointment_bot::webhook;
use reqwest::StatusCode;
use serde_json::{Value, json};
use shared::catalog::Catalog;
use shared::dialog::DialogController;
use support::{API_BASE, RecordingNotifier, ScriptedProbe, registry_with, watch_settings};
use tokio::net::TcpListener;

const TOKEN: &str = "123456:test-token";

struct WebhookServer {
    base_url: String,
    notifier: Arc<RecordingNotifier>,
    handle: tokio::task::JoinHandle<()>,
}

impl WebhookServer {
    async fn start() -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = registry_with(
            Arc::new(ScriptedProbe::default()),
            notifier.clone(),
            watch_settings(false),
        );
        let router = Arc::new(CommandRouter::new(
            DialogController::new(Catalog::default(), API_BASE),
            registry,
            None,
            notifier.clone(),
        ));
        let app = webhook::app(router, TOKEN);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("webhook listener should bind");
        let bind_addr = listener
            .local_addr()
            .expect("webhook listener local address should exist");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("webhook server should run");
        });

        Self {
            base_url: format!("http://{bind_addr}"),
            notifier,
            handle,
        }
    }
}

impl Drop for WebhookServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn update(chat_id: i64, text: &str) -> Value {
    json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "date": 1700000000,
            "chat": {"id": chat_id, "type": "private"},
            "text": text,
        }
    })
}

#[tokio::test]
async fn health_and_unknown_paths() {
    let server = WebhookServer::start().await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{}/healthz", server.base_url))
        .send()
        .await
        .expect("healthz request should succeed");
    assert_eq!(health.status(), StatusCode::OK);
    let body: Value = health.json().await.expect("healthz should return json");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_jobs"], 0);

    let root = client
        .get(format!("{}/", server.base_url))
        .send()
        .await
        .expect("root request should succeed");
    assert_eq!(root.status(), StatusCode::NOT_FOUND);

    let wrong_token = client
        .post(format!("{}/not-the-token", server.base_url))
        .json(&update(1, "/help"))
        .send()
        .await
        .expect("webhook request should succeed");
    assert_eq!(wrong_token.status(), StatusCode::NOT_FOUND);
    assert!(server.notifier.sent().is_empty());
}

#[tokio::test]
async fn updates_on_the_token_path_reach_the_router() {
    let server = WebhookServer::start().await;
    let client = reqwest::Client::new();
    let url = format!("{}/{TOKEN}", server.base_url);

    let response = client
        .post(&url)
        .json(&update(77, "/help"))
        .send()
        .await
        .expect("webhook request should succeed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.notifier.texts_for(77), vec![HELP_TEXT.to_string()]);

    let response = client
        .post(&url)
        .json(&json!({"update_id": 2, "edited_message": {"chat": {"id": 77}}}))
        .send()
        .await
        .expect("webhook request should succeed");
    assert_eq!(response.status(), StatusCode::OK);

    let malformed = client
        .post(&url)
        .body("not json")
        .send()
        .await
        .expect("webhook request should succeed");
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.notifier.sent().len(), 1);
}
