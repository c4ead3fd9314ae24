/**
 * CAPTION RUNNER - Description d'images par commande externe
 *
 * FONCTIONNEMENT :
 * - L'image uploadée est écrite dans le répertoire d'upload sous un nom UUID
 * - La commande configurée (ex: `python3 caption.py {image}`) est découpée
 *   avec shell-words, `{image}` remplacé par le chemin du fichier
 * - stdout (trimé) = description ; stderr non vide = warning
 * - Le fichier est supprimé dans tous les cas (succès, échec, timeout,
 *   requête annulée) : une garde le retire au drop
 */

use crate::config::CaptionConf;
use pimon_telemetry::{CommandError, CommandExecutor};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const IMAGE_PLACEHOLDER: &str = "{image}";

#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("Staging error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Caption command failed: {0}")]
    Command(#[from] CommandError),
    #[error("Invalid caption command template: {0}")]
    Template(#[from] shell_words::ParseError),
}

pub struct CaptionRunner {
    config: CaptionConf,
    executor: CommandExecutor,
}

impl CaptionRunner {
    pub fn new(config: CaptionConf) -> Self {
        let executor = CommandExecutor::new(config.timeout());
        Self { config, executor }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.upload_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes()
    }

    /// Stage l'image, lance la commande, nettoie. Retourne la description.
    pub async fn describe(
        &self,
        bytes: &[u8],
        original_name: Option<&str>,
    ) -> Result<String, CaptionError> {
        let staged = self.stage(bytes, original_name).await?;
        self.run(staged.path()).await
    }

    async fn stage(
        &self,
        bytes: &[u8],
        original_name: Option<&str>,
    ) -> Result<StagedImage, CaptionError> {
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        let mut name = Uuid::new_v4().to_string();
        if let Some(ext) = original_name.and_then(safe_extension) {
            name.push('.');
            name.push_str(&ext);
        }
        // garde créée avant l'écriture : une écriture partielle est aussi nettoyée
        let staged = StagedImage { path: self.config.upload_dir.join(name) };
        tokio::fs::write(staged.path(), bytes).await?;
        debug!("staged {} bytes at {}", bytes.len(), staged.path().display());
        Ok(staged)
    }

    async fn run(&self, image: &Path) -> Result<String, CaptionError> {
        let argv = build_argv(&self.config.command, image)?;
        let output = self.executor.run(&argv).await?;
        if !output.stderr.trim().is_empty() {
            warn!("caption stderr: {}", output.stderr.trim());
        }
        let description = output.stdout.trim().to_string();
        info!("image described in {}ms", output.execution_time_ms);
        Ok(description)
    }
}

/// Fichier uploadé, supprimé au drop (y compris si la requête est annulée
/// pendant que la commande tourne)
struct StagedImage {
    path: PathBuf,
}

impl StagedImage {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed staged image {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove staged image {}: {}", self.path.display(), e),
        }
    }
}

/// Découpe le template ; sans `{image}`, le chemin est ajouté en dernier argument
pub fn build_argv(template: &str, image: &Path) -> Result<Vec<String>, shell_words::ParseError> {
    let image = image.to_string_lossy();
    let mut argv = shell_words::split(template)?;
    let mut substituted = false;
    for arg in argv.iter_mut() {
        if arg.contains(IMAGE_PLACEHOLDER) {
            *arg = arg.replace(IMAGE_PLACEHOLDER, &image);
            substituted = true;
        }
    }
    if !substituted && !argv.is_empty() {
        argv.push(image.into_owned());
    }
    Ok(argv)
}

/// Extension du nom client, seulement si courte et alphanumérique
fn safe_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    let valid = !ext.is_empty()
        && ext.len() <= 8
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pimon_devkit::StoreFixture;
    use std::time::Duration;

    fn runner(fixture: &StoreFixture, command: &str) -> CaptionRunner {
        CaptionRunner::new(CaptionConf {
            command: command.into(),
            upload_dir: fixture.path().join("uploads"),
            timeout_secs: 5,
            ..CaptionConf::default()
        })
    }

    #[test]
    fn test_build_argv_substitutes_placeholder() {
        let argv = build_argv("python3 caption.py {image}", Path::new("uploads/abc")).unwrap();
        assert_eq!(argv, vec!["python3", "caption.py", "uploads/abc"]);

        let argv = build_argv("caption --input={image} --fast", Path::new("/tmp/x.jpg")).unwrap();
        assert_eq!(argv, vec!["caption", "--input=/tmp/x.jpg", "--fast"]);
    }

    #[test]
    fn test_build_argv_appends_when_no_placeholder() {
        let argv = build_argv("python3 caption.py", Path::new("uploads/abc")).unwrap();
        assert_eq!(argv, vec!["python3", "caption.py", "uploads/abc"]);
        assert!(build_argv("", Path::new("x")).unwrap().is_empty());
        assert!(build_argv("python3 'oops", Path::new("x")).is_err());
    }

    #[test]
    fn test_safe_extension() {
        assert_eq!(safe_extension("cat.JPG").as_deref(), Some("jpg"));
        assert_eq!(safe_extension("photo.png").as_deref(), Some("png"));
        assert_eq!(safe_extension("noext"), None);
        assert_eq!(safe_extension("evil.j/pg"), None);
        assert_eq!(safe_extension("weird.p%g"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_describe_returns_trimmed_stdout_and_cleans_up() {
        let fixture = StoreFixture::new().unwrap();
        let runner = runner(&fixture, "sh -c 'echo \"  a cat on a sofa  \"' {image}");

        let description = runner.describe(b"\xFF\xD8fake jpeg", Some("cat.jpg")).await.unwrap();
        assert_eq!(description, "a cat on a sofa");
        assert_eq!(fixture.count_files("uploads").unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sees_staged_file() {
        let fixture = StoreFixture::new().unwrap();
        let runner = runner(&fixture, "cat {image}");

        let description = runner.describe(b"pixels", None).await.unwrap();
        assert_eq!(description, "pixels");
        assert_eq!(fixture.count_files("uploads").unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_still_removes_staged_file() {
        let fixture = StoreFixture::new().unwrap();
        let runner = runner(&fixture, "sh -c 'echo model missing >&2; exit 1' {image}");

        let err = runner.describe(b"pixels", Some("a.png")).await.unwrap_err();
        assert!(matches!(err, CaptionError::Command(CommandError::Failed { .. })));
        assert_eq!(fixture.count_files("uploads").unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_describe_removes_staged_file() {
        let fixture = StoreFixture::new().unwrap();
        let runner = runner(&fixture, "sh -c 'sleep 5' {image}");

        let cancelled = tokio::time::timeout(
            Duration::from_millis(300),
            runner.describe(b"pixels", Some("a.jpg")),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(fixture.count_files("uploads").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_program_still_removes_staged_file() {
        let fixture = StoreFixture::new().unwrap();
        let runner = runner(&fixture, "pimon-no-such-captioner {image}");

        let err = runner.describe(b"pixels", None).await.unwrap_err();
        assert!(matches!(err, CaptionError::Command(CommandError::Spawn { .. })));
        assert_eq!(fixture.count_files("uploads").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_template() {
        let fixture = StoreFixture::new().unwrap();
        let runner = runner(&fixture, "python3 'caption.py {image}");

        let err = runner.describe(b"pixels", None).await.unwrap_err();
        assert!(matches!(err, CaptionError::Template(_)));
        assert_eq!(fixture.count_files("uploads").unwrap(), 0);
    }
}
