/**
 * CHAT PROXY - Pont API REST ↔ serveur d'inférence local (Ollama)
 *
 * RÔLE :
 * Reçoit un message utilisateur + un identifiant de modèle, choisit le
 * persona système, relaie la requête au serveur d'inférence, extrait la
 * réponse et journalise l'échange.
 *
 * FONCTIONNEMENT (par appel) :
 * Validating → Dispatching → AwaitingUpstream → {TimedOut | Failed | Parsing}
 *   → {ParseFailed | Replying} → Logging (best-effort) → Done
 * - Message vide/absent : rejet immédiat, aucun appel upstream
 * - Timeout : le futur HTTP est abandonné (requête annulée)
 * - Journalisation : seulement après une réponse arrivée à temps ; un échec
 *   d'écriture est loggé mais ne change pas la réponse
 * - Pas de retry : le client renvoie sa requête s'il le souhaite
 */

use crate::config::ChatConf;
use crate::models::{ChatReply, ChatRequest, UpstreamRequest};
use crate::ports::{NewExchange, SharedLog};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Réponse par défaut quand aucun champ connu n'est rempli
pub const NO_REPLY: &str = "No reply";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("No message provided")]
    MissingMessage,
    #[error("Upstream did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),
    #[error("Invalid upstream response: {0}")]
    InvalidUpstreamResponse(#[source] serde_json::Error),
}

/// Persona système, choisi d'après l'identifiant du modèle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// Persona par défaut
    Club,
    /// Modèles dont l'identifiant contient le marqueur configuré
    Technical,
}

impl Persona {
    pub fn for_model(model: &str, marker: &str) -> Self {
        if !marker.is_empty() && model.contains(marker) {
            Persona::Technical
        } else {
            Persona::Club
        }
    }

    pub fn instructions(self) -> &'static str {
        match self {
            Persona::Club => "You are a helpful STEM club assistant.",
            Persona::Technical => {
                "You are a precise technical assistant for a STEM club. \
                 Answer concisely and show your reasoning."
            }
        }
    }
}

type ReplyField = fn(&Value) -> Option<&str>;

fn message_content(body: &Value) -> Option<&str> {
    body.get("message")?.get("content")?.as_str()
}

fn response_field(body: &Value) -> Option<&str> {
    body.get("response")?.as_str()
}

fn output_field(body: &Value) -> Option<&str> {
    body.get("output")?.as_str()
}

/// Formats de réponse acceptés, par ordre de priorité. Tolère les variantes
/// de schéma des serveurs d'inférence (chat, generate, générique).
const REPLY_FIELDS: [(&str, ReplyField); 3] = [
    ("message.content", message_content),
    ("response", response_field),
    ("output", output_field),
];

/// Premier champ non vide parmi REPLY_FIELDS, sinon NO_REPLY
pub fn extract_reply(body: &Value) -> String {
    REPLY_FIELDS
        .iter()
        .find_map(|(name, field)| {
            let text = field(body).filter(|text| !text.is_empty())?;
            debug!("reply taken from `{}`", name);
            Some(text)
        })
        .unwrap_or(NO_REPLY)
        .to_string()
}

pub struct ChatProxy {
    client: reqwest::Client,
    config: ChatConf,
    log: SharedLog,
}

impl ChatProxy {
    pub fn new(config: ChatConf, log: SharedLog) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config, log })
    }

    /// Modèle demandé, ou le modèle par défaut si absent/vide
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_model)
            .to_string()
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        // Validating
        let message = request
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or(ChatError::MissingMessage)?;
        let model = self.resolve_model(request.model.as_deref());
        let persona = Persona::for_model(&model, &self.config.persona_marker);
        info!(%model, ?persona, "message from frontend: {}", message);

        // Dispatching → AwaitingUpstream
        let body = UpstreamRequest::new(&model, persona.instructions(), message);
        let timeout = self.config.timeout();
        let raw = match tokio::time::timeout(timeout, self.send(&body)).await {
            Err(_) => {
                warn!(%model, "upstream timed out after {:?}", timeout);
                return Err(ChatError::Timeout(timeout));
            }
            Ok(Err(e)) => {
                error!(%model, "upstream request error: {}", e);
                return Err(ChatError::UpstreamUnreachable(e));
            }
            Ok(Ok(raw)) => raw,
        };

        // Parsing
        let parsed: Value = serde_json::from_slice(&raw).map_err(|e| {
            error!("failed to parse upstream response: {}", String::from_utf8_lossy(&raw));
            ChatError::InvalidUpstreamResponse(e)
        })?;
        let reply = extract_reply(&parsed);
        info!(%model, "AI reply: {}", reply);

        // Logging : la réponse est arrivée à temps, le futur upstream est terminé
        self.record(NewExchange {
            timestamp: OffsetDateTime::now_utc(),
            user_message: message.to_string(),
            ai_reply: reply.clone(),
            model,
        })
        .await;

        Ok(ChatReply { reply })
    }

    /// POST vers l'upstream et lecture complète du corps
    async fn send(&self, body: &UpstreamRequest<'_>) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.post(&self.config.endpoint).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("upstream answered {}", status);
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Écriture best-effort : les erreurs sont loggées, jamais propagées
    async fn record(&self, exchange: NewExchange) {
        let log = Arc::clone(&self.log);
        match tokio::task::spawn_blocking(move || log.append(&exchange)).await {
            Ok(Ok(id)) => debug!(id, "exchange logged"),
            Ok(Err(e)) => error!("failed to insert log into DB: {}", e),
            Err(e) => error!("log append task failed: {}", e),
        }
    }
}
