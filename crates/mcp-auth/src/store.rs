//! Credential storage (C11): an async `get`/`put`/`delete`/`list` interface
//! plus a file-backed implementation with atomic, owner-only writes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::credential::Credential;
use crate::error::{AuthError, Result};

/// Storage for OAuth credentials, keyed by server URL.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up the credential for `server_url`, if one is stored.
    async fn get(&self, server_url: &str) -> Result<Option<Credential>>;

    /// Validate and store `credential`, replacing any existing entry for its
    /// `server_url`. Atomic from the caller's perspective: a failure never
    /// leaves a partially written record observable by a later `get`.
    async fn put(&self, credential: &Credential) -> Result<()>;

    /// Remove the credential for `server_url`, if any.
    async fn delete(&self, server_url: &str) -> Result<()>;

    /// List every server URL with a stored credential.
    async fn list(&self) -> Result<Vec<String>>;
}

/// A file-backed [`CredentialStore`]: one JSON document holding every
/// credential, written via temp-file-then-rename with `0600` permissions.
///
/// The temp-file-then-rename technique only makes a single write atomic; it
/// says nothing about two concurrent writers racing on the same document.
/// `write_lock` serializes the read-modify-write sequence in `put`/`delete`
/// so one caller's mutation can't be clobbered by another's concurrent one.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Use `path` as the backing file; it is created on first `put` if
    /// missing.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<Credential>> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AuthError::Store(format!("corrupt credential store: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, credentials: &[Credential]) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(credentials)
            .map_err(|e| AuthError::Store(format!("failed to serialize credential store: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = sibling_temp_path(&self.path);
        fs::write(&temp_path, &serialized).await?;
        set_owner_only_permissions(&temp_path).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, server_url: &str) -> Result<Option<Credential>> {
        let credentials = self.read_all().await?;
        Ok(credentials.into_iter().find(|c| c.server_url == server_url))
    }

    async fn put(&self, credential: &Credential) -> Result<()> {
        credential.validate()?;
        let _guard = self.write_lock.lock().await;
        let mut credentials = self.read_all().await?;
        credentials.retain(|c| c.server_url != credential.server_url);
        credentials.push(credential.clone());
        self.write_all(&credentials).await
    }

    async fn delete(&self, server_url: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut credentials = self.read_all().await?;
        credentials.retain(|c| c.server_url != server_url);
        self.write_all(&credentials).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        let credentials = self.read_all().await?;
        Ok(credentials.into_iter().map(|c| c.server_url).collect())
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".to_string());
    path.with_file_name(format!(".{file_name}.tmp-{}", std::process::id()))
}

#[cfg(unix)]
async fn set_owner_only_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_only_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn credential(server_url: &str) -> Credential {
        Credential::new(
            None,
            server_url,
            "client-1",
            None,
            "access-token",
            Some("refresh-token".into()),
            9_999_999_999_999,
            vec!["mcp:tools".into()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.put(&credential("https://mcp.example.com")).await.unwrap();

        let fetched = store.get("https://mcp.example.com").await.unwrap().unwrap();
        assert_eq!(fetched.access_token, "access-token");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.get("https://mcp.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces_existing_entry_for_same_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.put(&credential("https://mcp.example.com")).await.unwrap();

        let mut updated = credential("https://mcp.example.com");
        updated.access_token = "new-token".into();
        store.put(&updated).await.unwrap();

        let fetched = store.get("https://mcp.example.com").await.unwrap().unwrap();
        assert_eq!(fetched.access_token, "new-token");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.put(&credential("https://mcp.example.com")).await.unwrap();
        store.delete("https://mcp.example.com").await.unwrap();
        assert!(store.get("https://mcp.example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_all_server_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.put(&credential("https://a.example.com")).await.unwrap();
        store.put(&credential("https://b.example.com")).await.unwrap();

        let mut urls = store.list().await.unwrap();
        urls.sort();
        assert_eq!(urls, vec!["https://a.example.com", "https://b.example.com"]);
    }

    #[tokio::test]
    async fn put_rejects_invalid_credential_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::new(path.clone());

        let mut invalid = credential("https://mcp.example.com");
        invalid.access_token = String::new();
        assert!(store.put(&invalid).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn concurrent_puts_for_distinct_servers_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let url = format!("https://server-{i}.example.com");
                store.put(&credential(&url)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut urls = store.list().await.unwrap();
        urls.sort();
        let mut expected: Vec<String> =
            (0..20).map(|i| format!("https://server-{i}.example.com")).collect();
        expected.sort();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn concurrent_put_and_delete_do_not_race() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
        store.put(&credential("https://keep.example.com")).await.unwrap();
        store.put(&credential("https://drop.example.com")).await.unwrap();

        let put_store = store.clone();
        let putter = tokio::spawn(async move {
            put_store.put(&credential("https://added.example.com")).await.unwrap();
        });
        let delete_store = store.clone();
        let deleter = tokio::spawn(async move {
            delete_store.delete("https://drop.example.com").await.unwrap();
        });
        putter.await.unwrap();
        deleter.await.unwrap();

        let mut urls = store.list().await.unwrap();
        urls.sort();
        assert_eq!(
            urls,
            vec!["https://added.example.com", "https://keep.example.com"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn backing_file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::new(path.clone());
        store.put(&credential("https://mcp.example.com")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
