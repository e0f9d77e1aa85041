//! # Common Test Utilities
//!
//! This module centralizes the test harness used across the `groundrag-server`
//! integration tests:
//!
//! - `TestApp::spawn_http`: the real providers, pointed at an
//!   `httpmock::MockServer` that plays the chat-completions and embeddings APIs.
//! - `TestApp::spawn_mocked`: scripted in-process providers from
//!   `groundrag-test-utils`, for tests that only care about HTTP behaviour.

// Allow unused code because this is a test utility module, and not all
// functions might be used by every test file that includes it.
#![allow(unused)]

use anyhow::Result;
use axum::serve;
use groundrag_server::{
    auth::middleware::Claims,
    config::{get_config, AppConfig},
    router,
    state::{build_app_state, build_app_state_with, AppState},
};
use groundrag_test_utils::{MockAiProvider, MockVectorStore};
use httpmock::prelude::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use serde_json::{json, Value};
use std::{
    net::SocketAddr,
    path::Path,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tempfile::{tempdir, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

pub const JWT_SECRET: &str = "test-secret";
pub const CHAT_PATH: &str = "/v1/chat/completions";
pub const EMBEDDINGS_PATH: &str = "/v1/embeddings";

/// A harness for end-to-end testing of the Axum server.
///
/// The server runs on a random port and shuts down when the harness is dropped.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub mock_server: MockServer,
    pub app_state: AppState,
    _config_dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

/// Writes a `config.yml` pointing both providers at `mock_server`, followed by
/// `extra_yaml`.
pub fn write_config(dir: &Path, mock_server: &MockServer, extra_yaml: &str) -> Result<AppConfig> {
    let config_path = dir.join("config.yml");
    let content = format!(
        r#"
port: 0
provider:
  api_url: "{}"
  api_key: null
  model_name: "mock-chat-model"
embedding:
  api_url: "{}"
  model_name: "mock-embedding-model"
{extra_yaml}
"#,
        mock_server.url(CHAT_PATH),
        mock_server.url(EMBEDDINGS_PATH),
    );
    std::fs::write(&config_path, content)?;
    Ok(get_config(Some(config_path.to_str().unwrap()))?)
}

/// An OpenAI-compatible chat-completions response body.
pub fn chat_reply(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

/// Issues an HS256 token for `sub`, expiring `ttl_secs` from now.
pub fn generate_jwt(secret: &str, sub: &str, ttl_secs: i64) -> Result<String> {
    generate_jwt_with_audience(secret, sub, ttl_secs, None)
}

/// Like [`generate_jwt`], with an optional `aud` claim.
pub fn generate_jwt_with_audience(
    secret: &str,
    sub: &str,
    ttl_secs: i64,
    aud: Option<&str>,
) -> Result<String> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
    let claims = Claims {
        sub: sub.to_string(),
        exp: (now + ttl_secs).max(0) as usize,
        aud: aud.map(str::to_string),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

impl TestApp {
    /// Spawns the server with the real HTTP providers and the given corpus.
    ///
    /// Every embedding request returns the same vector, so all chunks score
    /// equally and come back in corpus order.
    pub async fn spawn_http(corpus: &Value, extra_yaml: &str) -> Result<Self> {
        let mock_server = MockServer::start_async().await;
        mock_server
            .mock_async(|when, then| {
                when.method(POST).path(EMBEDDINGS_PATH);
                then.status(200)
                    .json_body(json!({ "data": [{ "embedding": [1.0, 0.0, 0.0] }] }));
            })
            .await;

        let config_dir = tempdir()?;
        let corpus_path = config_dir.path().join("corpus.json");
        std::fs::write(&corpus_path, corpus.to_string())?;
        let extra_yaml = format!(
            "corpus_path: \"{}\"\n{extra_yaml}",
            corpus_path.to_str().unwrap()
        );

        let config = write_config(config_dir.path(), &mock_server, &extra_yaml)?;
        let app_state = build_app_state(config).await?;
        Self::serve(app_state, mock_server, config_dir).await
    }

    /// Spawns the server over scripted in-process providers.
    pub async fn spawn_mocked(
        ai: &MockAiProvider,
        store: Arc<MockVectorStore>,
        extra_yaml: &str,
    ) -> Result<Self> {
        let mock_server = MockServer::start_async().await;
        let config_dir = tempdir()?;
        let config = write_config(config_dir.path(), &mock_server, extra_yaml)?;
        let app_state = build_app_state_with(config, Box::new(ai.clone()), store)?;
        Self::serve(app_state, mock_server, config_dir).await
    }

    async fn serve(app_state: AppState, mock_server: MockServer, config_dir: TempDir) -> Result<Self> {
        dotenvy::dotenv().ok();
        // `try_init` is used to prevent panic if the logger is already initialized.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");
        let app_state_for_harness = app_state.clone();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server_handle = tokio::spawn(async move {
            let app = router::create_router(app_state);
            let server = serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        Ok(Self {
            address,
            client: Client::new(),
            mock_server,
            app_state: app_state_for_harness,
            _config_dir: config_dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Posts `{ "query": query }` to `/answer`, optionally with `?debug=true`.
    pub async fn ask(&self, query: &str, debug: bool) -> Result<reqwest::Response> {
        let url = if debug {
            format!("{}/answer?debug=true", self.address)
        } else {
            format!("{}/answer", self.address)
        };
        Ok(self
            .client
            .post(url)
            .json(&json!({ "query": query }))
            .send()
            .await?)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
