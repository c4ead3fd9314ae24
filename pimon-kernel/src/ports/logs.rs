/**
 * PORT LOGS v1 - Stockage SQLite des échanges chat
 *
 * FONCTIONNEMENT :
 * - Une connexion SQLite ouverte au démarrage, protégée par un Mutex
 *   (un seul écrivain à la fois, garanti par le port lui-même)
 * - Table `logs(id, timestamp, user_message, ai_reply, model)`, id AUTOINCREMENT
 * - Migration au démarrage : ajout de la colonne `model` si la base a été
 *   créée par une version antérieure ; les anciennes lignes relisent `None`
 */

use super::{ChatExchange, ExchangeLog, LogError, NewExchange};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT,
    user_message TEXT,
    ai_reply TEXT
)";

pub struct SqliteExchangeLog {
    conn: Mutex<Connection>,
}

impl SqliteExchangeLog {
    /// Ouvre (ou crée) la base au chemin donné
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL : les lectures de /api/logs ne bloquent pas les écritures
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let log = Self::init(conn)?;
        info!("exchange log opened at {}", path.display());
        Ok(log)
    }

    /// Base en mémoire (tests)
    pub fn open_in_memory() -> Result<Self, LogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LogError> {
        conn.execute_batch(SCHEMA)?;
        if !has_column(&conn, "logs", "model")? {
            conn.execute_batch("ALTER TABLE logs ADD COLUMN model TEXT")?;
            info!("exchange log migrated: added `model` column");
        }
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, LogError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

impl ExchangeLog for SqliteExchangeLog {
    fn append(&self, exchange: &NewExchange) -> Result<i64, LogError> {
        let timestamp = exchange.timestamp.format(&Rfc3339)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO logs (timestamp, user_message, ai_reply, model) VALUES (?1, ?2, ?3, ?4)",
            params![timestamp, exchange.user_message, exchange.ai_reply, exchange.model],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_all(&self) -> Result<Vec<ChatExchange>, LogError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, user_message, ai_reply, model FROM logs ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ChatExchange {
                    id: row.get(0)?,
                    timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    user_message: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    ai_reply: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    model: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
