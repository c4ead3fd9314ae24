use serde::{Deserialize, Serialize};

/// Corps de POST /api/chat
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChatReply { pub reply: String }

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptionReply { pub description: String }

// Requête envoyée au serveur d'inférence (format /api/chat d'Ollama)
#[derive(Debug, Serialize)]
pub struct UpstreamRequest<'a> {
    pub model: &'a str,
    pub messages: [UpstreamMessage<'a>; 2],
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct UpstreamMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> UpstreamRequest<'a> {
    /// Persona en message système + message utilisateur, sans streaming
    pub fn new(model: &'a str, persona: &'a str, message: &'a str) -> Self {
        Self {
            model,
            messages: [
                UpstreamMessage { role: "system", content: persona },
                UpstreamMessage { role: "user", content: message },
            ],
            stream: false,
        }
    }
}
