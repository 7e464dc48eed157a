use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::core::auth::{AuthError, Credential, CredentialStore};

/// Keeps the local flow's credential in a JSON file (`token.json` by default).
pub struct TokenFileStore {
    path: PathBuf,
}

impl TokenFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CredentialStore for TokenFileStore {
    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        match serde_json::from_str(&text) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                // An unreadable token file just means authorizing again.
                tracing::warn!("Ignoring unreadable token file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;
        }

        let text =
            serde_json::to_string_pretty(credential).map_err(|e| AuthError::Store(e.to_string()))?;
        fs::write(&self.path, text)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    async fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Store(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn credential() -> Credential {
        Credential {
            access_token: "ya29.a0".to_string(),
            refresh_token: Some("1//0g".to_string()),
            expiry: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
            scopes: vec!["https://www.googleapis.com/auth/drive".to_string()],
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = TokenFileStore::new(dir.path().join("token.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_and_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let store = TokenFileStore::new(&path);

        store.save(&credential()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(credential()));

        store.clear().await.unwrap();
        assert!(!path.exists());
        // Clearing twice is fine.
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = TokenFileStore::new(&path);
        assert_eq!(store.load().await.unwrap(), None);
    }
}
