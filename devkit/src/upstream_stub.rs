/*!
Faux serveur d'inférence pour tester le proxy chat sans Ollama

Démarre un vrai serveur HTTP (axum) sur un port éphémère de 127.0.0.1.
Enregistre chaque requête reçue et répond selon un scénario configurable
(JSON, texte brut, statut d'erreur, délai).
*/

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Scénario de réponse du faux upstream
#[derive(Debug, Clone)]
pub enum StubReply {
    /// 200 + corps JSON
    Json(Value),
    /// 200 + corps texte arbitraire (pas forcément du JSON)
    Raw(String),
    /// Statut HTTP arbitraire + corps JSON
    Status(u16, Value),
    /// Attend avant de répondre avec le scénario interne
    Delayed(Duration, Box<StubReply>),
}

impl StubReply {
    pub fn delayed(delay: Duration, inner: StubReply) -> Self {
        StubReply::Delayed(delay, Box::new(inner))
    }
}

#[derive(Clone)]
struct StubState {
    reply: Arc<Mutex<StubReply>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// Serveur upstream simulé (compatible `/api/chat` d'Ollama)
pub struct MockUpstream {
    addr: SocketAddr,
    state: StubState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    /// Démarre le serveur et retourne dès qu'il écoute
    pub async fn start(reply: StubReply) -> Result<Self> {
        let state = StubState {
            reply: Arc::new(Mutex::new(reply)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/api/chat", post(handle_chat))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                rx.await.ok();
            });
            if let Err(e) = server.await {
                log::warn!("[MOCK] upstream server stopped: {}", e);
            }
        });

        log::info!("[MOCK] upstream listening on http://{}", addr);
        Ok(Self {
            addr,
            state,
            shutdown: Some(tx),
        })
    }

    /// URL complète de l'endpoint chat
    pub fn url(&self) -> String {
        format!("http://{}/api/chat", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Change le scénario pour les requêtes suivantes
    pub fn set_reply(&self, reply: StubReply) {
        *self.state.reply.lock().unwrap() = reply;
    }

    /// Corps JSON de toutes les requêtes reçues (pour assertions)
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<Value> {
        self.state.requests.lock().unwrap().last().cloned()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
    }
}

async fn handle_chat(State(state): State<StubState>, body: Bytes) -> Response {
    let parsed = serde_json::from_slice::<Value>(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
    state.requests.lock().unwrap().push(parsed);
    log::info!("📨 [MOCK] upstream received {} bytes", body.len());

    let mut reply = state.reply.lock().unwrap().clone();
    loop {
        match reply {
            StubReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            StubReply::Json(value) => return Json(value).into_response(),
            StubReply::Raw(text) => return (StatusCode::OK, text).into_response(),
            StubReply::Status(code, value) => {
                let status =
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                return (status, Json(value)).into_response();
            }
        }
    }
}

/// URL d'un port local sur lequel plus personne n'écoute (connexion refusée)
pub fn closed_port_url() -> Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}/api/chat", addr))
}

/// Payloads aux différents formats de réponse upstream
pub struct UpstreamPayloads;

impl UpstreamPayloads {
    /// Format `/api/chat` d'Ollama
    pub fn chat_message(content: &str) -> Value {
        serde_json::json!({
            "model": "gemma:2b",
            "created_at": "2025-01-01T00:00:00Z",
            "message": { "role": "assistant", "content": content },
            "done": true
        })
    }

    /// Format `/api/generate` d'Ollama
    pub fn generate(text: &str) -> Value {
        serde_json::json!({ "model": "gemma:2b", "response": text, "done": true })
    }

    /// Format générique `{output}`
    pub fn output(text: &str) -> Value {
        serde_json::json!({ "output": text })
    }

    /// Erreur Ollama (modèle inconnu, etc.)
    pub fn error(message: &str) -> Value {
        serde_json::json!({ "error": message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_upstream_records_and_replies() {
        let upstream = MockUpstream::start(StubReply::Json(UpstreamPayloads::chat_message("salut")))
            .await
            .unwrap();

        let client = reqwest::Client::new();
        let response: Value = client
            .post(upstream.url())
            .json(&serde_json::json!({"model": "gemma:2b", "stream": false}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(response["message"]["content"], "salut");
        assert!(upstream.addr().ip().is_loopback());
        assert!(upstream.url().contains(&upstream.addr().port().to_string()));
        assert_eq!(upstream.request_count(), 1);
        assert_eq!(upstream.last_request().unwrap()["model"], "gemma:2b");
    }

    #[tokio::test]
    async fn test_raw_and_status_replies() {
        let upstream = MockUpstream::start(StubReply::Raw("not json".into())).await.unwrap();
        let client = reqwest::Client::new();

        let response = client.post(upstream.url()).body("{}").send().await.unwrap();
        let body = response.text().await.unwrap();
        assert_eq!(body, "not json");

        upstream.set_reply(StubReply::Status(404, UpstreamPayloads::error("model not found")));
        let response = client.post(upstream.url()).body("{}").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(upstream.request_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_port_refuses() {
        let url = closed_port_url().unwrap();
        let err = reqwest::Client::new().post(url).body("{}").send().await.unwrap_err();
        assert!(err.is_connect());
    }

    #[test]
    fn test_payload_builders() {
        assert_eq!(UpstreamPayloads::chat_message("a")["message"]["content"], "a");
        assert_eq!(UpstreamPayloads::generate("b")["response"], "b");
        assert_eq!(UpstreamPayloads::output("c")["output"], "c");
        assert_eq!(UpstreamPayloads::error("d")["error"], "d");
    }
}
