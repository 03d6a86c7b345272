use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

/// 生成単位の一時ディレクトリ。
///
/// 初回利用時に作成し、`cleanup` もしくは Drop で必ず削除する。
/// Drop側はパニックや早期リターンに対する保険で、通常経路では
/// フェーズ末尾の `cleanup` が呼ばれる。
#[derive(Debug)]
pub(crate) struct ScopedTempDir {
    path: PathBuf,
    cleaned: bool,
}

impl ScopedTempDir {
    pub(crate) async fn create(root: &Path, name: &str) -> Result<Self> {
        let path = root.join(name);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create temp dir {}", path.display()))?;
        Ok(Self {
            path,
            cleaned: false,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// 一時ディレクトリを明示的に削除する。
    pub(crate) async fn cleanup(mut self) {
        self.cleaned = true;
        if let Err(error) = tokio::fs::remove_dir_all(&self.path).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %error, "failed to remove temp dir");
            }
        }
    }
}

impl Drop for ScopedTempDir {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        if let Err(error) = std::fs::remove_dir_all(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %error, "failed to remove temp dir on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_removes_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let scoped = ScopedTempDir::create(root.path(), "gen-1")
            .await
            .expect("create");
        let path = scoped.path().to_path_buf();
        assert!(path.is_dir());

        scoped.cleanup().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_removes_directory_as_fallback() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = {
            let scoped = ScopedTempDir::create(root.path(), "gen-2")
                .await
                .expect("create");
            scoped.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
