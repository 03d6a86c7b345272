use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use super::{ObjectStorage, StoredObject};

/// S3互換オブジェクトストア（AWS S3 / Cloudflare R2）。
///
/// R2はカスタムエンドポイントを指定したS3クライアントとして扱う。
/// 配信URLは `STORAGE_PUBLIC_BASE_URL` を前置して組み立てる。
#[derive(Debug, Clone)]
pub(crate) struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3Storage {
    pub(crate) async fn from_env(
        bucket: impl Into<String>,
        endpoint: Option<&str>,
        public_base_url: impl Into<String>,
    ) -> Self {
        let base = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = match endpoint {
            Some(endpoint) => {
                let conf = aws_sdk_s3::config::Builder::from(&base)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                aws_sdk_s3::Client::from_conf(conf)
            }
            None => aws_sdk_s3::Client::new(&base),
        };
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_file(&self, key: &str, file: &Path, content_type: &str) -> Result<StoredObject> {
        let body = ByteStream::from_path(file)
            .await
            .with_context(|| format!("failed to open {}", file.display()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to upload object {key}"))?;
        Ok(StoredObject {
            path: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("failed to upload object {key}"))?;
        Ok(StoredObject {
            path: key.to_string(),
            url: self.url_for(key),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to fetch object {key}"))?;
        let bytes = output
            .body
            .collect()
            .await
            .with_context(|| format!("failed to read object body {key}"))?;
        Ok(bytes.into_bytes().to_vec())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}
