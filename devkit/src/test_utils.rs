/*!
Fixtures pour les tests du kernel pimon

- Répertoire temporaire (base SQLite, uploads, fichiers statiques)
- Base au format historique: table `logs` créée avant l'ajout de la
  colonne `model`, pour vérifier la migration de schéma
*/

use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Schéma d'origine, avant la colonne `model`
const LEGACY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT,
    user_message TEXT,
    ai_reply TEXT
)";

/// Init logging pour tests (idempotent)
pub fn init_test_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Répertoire de travail jetable pour un test
pub struct StoreFixture {
    dir: TempDir,
}

impl StoreFixture {
    pub fn new() -> Result<Self> {
        init_test_logging();
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Chemin (non créé) de la base de logs
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("logs.db")
    }

    /// Sous-répertoire créé à la demande
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Écrit un fichier dans le répertoire temporaire
    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Crée `logs.db` avec l'ancien schéma et y insère des échanges
    /// `(timestamp, user_message, ai_reply)`
    pub fn seed_legacy_logs(&self, rows: &[(&str, &str, &str)]) -> Result<PathBuf> {
        let path = self.db_path();
        let conn = Connection::open(&path)?;
        conn.execute_batch(LEGACY_SCHEMA)?;
        for (timestamp, message, reply) in rows {
            conn.execute(
                "INSERT INTO logs (timestamp, user_message, ai_reply) VALUES (?1, ?2, ?3)",
                params![timestamp, message, reply],
            )?;
        }
        log::info!("🗄️ Seeded {} legacy log rows in {}", rows.len(), path.display());
        Ok(path)
    }

    /// Nombre de fichiers présents dans un sous-répertoire
    pub fn count_files(&self, name: &str) -> Result<usize> {
        let path = self.dir.path().join(name);
        if !path.exists() {
            return Ok(0);
        }
        Ok(std::fs::read_dir(path)?.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_schema_has_no_model_column() {
        let fixture = StoreFixture::new().unwrap();
        let path = fixture
            .seed_legacy_logs(&[("2024-05-01T10:00:00.000Z", "hi", "hello")])
            .unwrap();

        let conn = Connection::open(path).unwrap();
        let mut stmt = conn.prepare("PRAGMA table_info(logs)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(columns, vec!["id", "timestamp", "user_message", "ai_reply"]);

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM logs", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_subdir_and_count_files() {
        let fixture = StoreFixture::new().unwrap();
        assert_eq!(fixture.count_files("uploads").unwrap(), 0);
        let uploads = fixture.subdir("uploads").unwrap();
        std::fs::write(uploads.join("a.jpg"), b"x").unwrap();
        assert_eq!(fixture.count_files("uploads").unwrap(), 1);
    }
}
