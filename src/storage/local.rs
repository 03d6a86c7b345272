use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{ObjectStorage, StoredObject};

/// ファイルシステム上のオブジェクトストア。
///
/// 開発・単体構成向け。キーはルート直下の相対パスとして展開され、
/// HTTP側は `STORAGE_PUBLIC_BASE_URL` 配下で同じキーを配信する。
#[derive(Debug, Clone)]
pub(crate) struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub(crate) fn new(root: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put_file(&self, key: &str, file: &Path, _content_type: &str) -> Result<StoredObject> {
        let target = self.resolve(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::copy(file, &target)
            .await
            .with_context(|| format!("failed to store {} at {}", file.display(), key))?;
        Ok(StoredObject {
            path: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredObject> {
        let target = self.resolve(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("failed to write object {key}"))?;
        Ok(StoredObject {
            path: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.resolve(key))
            .await
            .with_context(|| format!("failed to read object {key}"))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path().to_path_buf(), "http://localhost:3001/files/");

        let stored = storage
            .put_bytes("scene-generation/scenes/s1/rendered.mp4", vec![1, 2, 3], "video/mp4")
            .await
            .expect("put succeeds");
        assert_eq!(stored.path, "scene-generation/scenes/s1/rendered.mp4");
        assert_eq!(
            stored.url,
            "http://localhost:3001/files/scene-generation/scenes/s1/rendered.mp4"
        );

        let bytes = storage
            .get("scene-generation/scenes/s1/rendered.mp4")
            .await
            .expect("get succeeds");
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path().to_path_buf(), "http://localhost/files");

        storage
            .put_bytes("k", vec![1], "application/octet-stream")
            .await
            .expect("first put");
        storage
            .put_bytes("k", vec![2, 3], "application/octet-stream")
            .await
            .expect("second put");

        assert_eq!(storage.get("k").await.expect("get"), vec![2, 3]);
    }
}
