use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, error};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tokio::{fs, fs::File};
use uuid::Uuid;

/// Namespace every stored payload lives under, both on disk and in `MediaFile.file`.
pub const UPLOADS_NAMESPACE: &str = "uploads";

/// Payload storage layout: {root}/uploads/{key}_{filename}
#[async_trait]
pub trait Storage: Send + Sync {
    /// Resolve the absolute path for a stored name such as `uploads/abc_photo.jpg`
    fn resolve_path(&self, name: &str) -> Result<PathBuf>;

    /// Write the whole payload under a fresh collision-safe name. Returns the stored name.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String>;

    /// Delete the resolved path if it exists; Ok if missing
    async fn delete(&self, name: &str) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct StorageImpl {
    root: PathBuf,
}

impl StorageImpl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn ensure_segment(segment: &str, label: &str) -> Result<()> {
        if segment.is_empty() {
            bail!("{} must not be empty", label);
        }
        if segment.contains('/') || segment.contains('\\') {
            bail!(
                "{} must be a single path segment without separators: {}",
                label,
                segment
            );
        }
        if segment == "." || segment == ".." {
            bail!("{} must not be '.' or '..'", label);
        }
        Ok(())
    }
}

/// Write, flush and fsync the whole payload. Errors from the background write
/// of tokio's `File` only surface on `flush`.
async fn write_synced(file: &mut File, bytes: &[u8]) -> Result<()> {
    file.write_all(bytes).await.context("write payload")?;
    file.flush().await.context("flush payload")?;
    file.sync_all().await.context("sync payload")?;
    Ok(())
}

/// Write `bytes` to `tmp_path` and rename it onto `final_path`.
/// On any failure the temp file is removed and nothing lands at `final_path`.
async fn write_atomically(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(tmp_path)
        .await
        .with_context(|| format!("create temp file {:?}", tmp_path))?;
    let written = write_synced(&mut file, bytes).await;
    drop(file);
    let res = match written {
        Ok(()) => fs::rename(tmp_path, final_path)
            .await
            .with_context(|| format!("rename {:?} -> {:?}", tmp_path, final_path)),
        Err(e) => Err(e.context(format!("write {:?}", tmp_path))),
    };
    if res.is_err() {
        if let Err(e) = fs::remove_file(tmp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("remove temp file {:?} error: {}", tmp_path, e);
            }
        }
    }
    res
}

/// Reduce a client supplied file name to a safe single segment.
pub fn sanitize_file_name(file_name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned = unsafe_chars.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl Storage for StorageImpl {
    fn resolve_path(&self, name: &str) -> Result<PathBuf> {
        let Some((namespace, object)) = name.split_once('/') else {
            bail!("stored name must be '{UPLOADS_NAMESPACE}/<object>': {name}");
        };
        if namespace != UPLOADS_NAMESPACE {
            bail!("stored name outside the {UPLOADS_NAMESPACE} namespace: {name}");
        }
        Self::ensure_segment(object, "object")?;
        Ok(self.root.join(UPLOADS_NAMESPACE).join(object))
    }

    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        let key = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{UPLOADS_NAMESPACE}/{key}_{}",
            sanitize_file_name(file_name)
        );
        let final_path = self.resolve_path(&name)?;
        let parent = self.root.join(UPLOADS_NAMESPACE);
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("create_dir_all {:?}", parent))?;

        // write to a temp file under the same directory, then atomic rename
        let tmp_path = parent.join(format!("{key}.part"));
        write_atomically(&tmp_path, &final_path, bytes).await?;
        debug!("wrote {} bytes to {:?}", bytes.len(), final_path);
        Ok(name)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve_path(name)?;
        match fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("remove_file {:?} error: {}", path, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_read_and_delete_roundtrip() -> Result<()> {
        let tmp_dir = std::env::temp_dir().join(format!("backup-device-test-{}", Uuid::new_v4()));
        let storage = StorageImpl::new(&tmp_dir);

        let data = b"hello world".to_vec();
        let name = storage.save("a.jpg", &data).await?;
        assert!(name.starts_with("uploads/"));
        assert!(name.ends_with("_a.jpg"));
        let path = storage.resolve_path(&name)?;
        assert!(path.starts_with(tmp_dir.join(UPLOADS_NAMESPACE)));
        assert_eq!(fs::read(&path).await?, data);

        storage.delete(&name).await?;
        assert!(!path.exists());
        // deleting twice is fine
        storage.delete(&name).await?;
        let _ = fs::remove_dir_all(&tmp_dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn same_file_name_never_collides() -> Result<()> {
        let tmp_dir = std::env::temp_dir().join(format!("backup-device-test-{}", Uuid::new_v4()));
        let storage = StorageImpl::new(&tmp_dir);
        let first = storage.save("a.jpg", b"one").await?;
        let second = storage.save("a.jpg", b"two").await?;
        assert_ne!(first, second);
        assert_eq!(fs::read(storage.resolve_path(&first)?).await?, b"one");
        assert_eq!(fs::read(storage.resolve_path(&second)?).await?, b"two");
        let _ = fs::remove_dir_all(&tmp_dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file() -> Result<()> {
        let tmp_dir = std::env::temp_dir().join(format!("backup-device-test-{}", Uuid::new_v4()));
        // a non-empty directory cannot be replaced by a file
        let final_path = tmp_dir.join("taken");
        fs::create_dir_all(final_path.join("inner")).await?;
        let tmp_path = tmp_dir.join("taken.part");

        assert!(write_atomically(&tmp_path, &final_path, b"payload").await.is_err());
        assert!(!tmp_path.exists());
        assert!(final_path.is_dir());
        let _ = fs::remove_dir_all(&tmp_dir).await;
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn write_errors_are_not_swallowed() -> Result<()> {
        // every write to /dev/full fails with ENOSPC
        let mut full = fs::OpenOptions::new().write(true).open("/dev/full").await?;
        let err = write_synced(&mut full, &vec![7u8; 1 << 20]).await.unwrap_err();
        let io = err.root_cause().downcast_ref::<std::io::Error>();
        assert!(io.is_some(), "unexpected error: {err:#}");
        Ok(())
    }

    #[test]
    fn resolve_rejects_names_outside_uploads() {
        let storage = StorageImpl::new("/srv/media");
        assert!(storage.resolve_path("uploads/x.jpg").is_ok());
        assert!(storage.resolve_path("x.jpg").is_err());
        assert!(storage.resolve_path("other/x.jpg").is_err());
        assert!(storage.resolve_path("uploads/../db.sqlite3").is_err());
        assert!(storage.resolve_path("uploads/..").is_err());
    }

    #[test]
    fn sanitize_keeps_only_the_safe_basename() {
        assert_eq!(sanitize_file_name("a.jpg"), "a.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\photos\\my pic.png"), "my_pic.png");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }
}
