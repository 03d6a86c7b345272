pub(crate) mod banner;
pub(crate) mod frames;
pub(crate) mod overlay;
pub(crate) mod pip;
pub(crate) mod video;

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::{WorkerError, WorkerResult};

/// 素材URLをストリーミングでローカルファイルへ落とす。
pub(crate) async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
) -> WorkerResult<()> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|error| WorkerError::upstream("download", error))?
        .error_for_status()
        .map_err(|error| WorkerError::upstream("download", error))?;

    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|error| WorkerError::Media(format!("failed to create {}: {error}", target.display())))?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|error| WorkerError::upstream("download", error))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|error| WorkerError::Media(format!("failed to write {}: {error}", target.display())))?;
    }
    file.flush()
        .await
        .map_err(|error| WorkerError::Media(format!("failed to flush {}: {error}", target.display())))?;
    Ok(())
}

/// 素材URLの内容をメモリへ取得する。
pub(crate) async fn download_bytes(client: &reqwest::Client, url: &str) -> WorkerResult<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| WorkerError::upstream("download", error))?
        .error_for_status()
        .map_err(|error| WorkerError::upstream("download", error))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|error| WorkerError::upstream("download", error))?;
    Ok(bytes.to_vec())
}
