/**
 * LOG PORT - Journal persistant des échanges chat
 *
 * RÔLE :
 * Définit l'interface du journal append-only des conversations IA :
 * chaque échange = horodatage + message utilisateur + réponse IA + modèle.
 *
 * FONCTIONNEMENT :
 * - ExchangeLog trait = interface commune (append / list_all)
 * - NewExchange = échange à écrire (l'id est attribué par le stockage)
 * - ChatExchange = échange relu, id monotone attribué à l'insertion
 * - Pas d'update ni de delete : le journal ne fait que grossir
 *
 * CONCURRENCE :
 * Une seule instance par process, partagée par Arc. Les implémentations
 * sérialisent elles-mêmes les écritures ; les appelants async passent par
 * spawn_blocking.
 */

pub mod logs;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

pub use logs::SqliteExchangeLog;

/// Erreurs possibles du journal
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timestamp formatting error: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Échange à enregistrer
#[derive(Debug, Clone)]
pub struct NewExchange {
    pub timestamp: OffsetDateTime,
    pub user_message: String,
    pub ai_reply: String,
    pub model: String,
}

/// Échange relu depuis le journal (noms de champs = colonnes de la table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub id: i64,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub user_message: String,
    pub ai_reply: String,
    /// Absent pour les lignes écrites avant l'ajout de la colonne
    pub model: Option<String>,
}

/// Interface du journal des échanges
pub trait ExchangeLog: Send + Sync {
    /// Ajoute un échange, retourne l'id attribué
    fn append(&self, exchange: &NewExchange) -> Result<i64, LogError>;

    /// Tous les échanges, du plus récent au plus ancien
    fn list_all(&self) -> Result<Vec<ChatExchange>, LogError>;
}

/// Handle unique du journal, ouvert au démarrage
pub type SharedLog = Arc<dyn ExchangeLog>;
