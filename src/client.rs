//! Defines the global S3 client, and the blob store backed by it.

use crate::storage::BlobStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::{from_env, SdkConfig};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use once_cell::sync::OnceCell;
use std::env;

/// Loads the shared AWS configuration, honoring an overridden
/// endpoint for S3-compatible services.
pub async fn aws_config() -> SdkConfig {
    let endpoint_url_var = env::var("AWS_ENDPOINT_URL");
    if let Ok(endpoint_url) = endpoint_url_var {
        from_env()
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .region("us-east-1") // should be OK since the endpoint was overridden
            .load()
    } else {
        from_env().load()
    }
    .await
}

/// A blob store where containers are S3 buckets and blob names are
/// object keys.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn delete_blob(&self, container: &str, name: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to delete object {:?} from bucket {:?}",
                    name, container
                )
            })?;
        Ok(())
    }

    async fn get_blob(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(container)
            .key(name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let e = e.into_service_error();
                if e.is_no_such_key() {
                    return Ok(None);
                }
                return Err(e).with_context(|| {
                    format!(
                        "Failed to download object {:?} from bucket {:?}",
                        name, container
                    )
                });
            }
        };
        let body = response.body.collect().await.with_context(|| {
            format!(
                "Failed to read the contents of remote object {:?} from bucket {:?}",
                name, container
            )
        })?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn put_blob(&self, container: &str, name: &str, content: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(container)
            .key(name)
            .body(ByteStream::from(content))
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload remote object {:?} in bucket {:?}",
                    name, container
                )
            })?;
        Ok(())
    }
}

/// Global S3-backed store instance.
static CURRENT: OnceCell<S3Store> = OnceCell::new();

/// Initialize the global S3-backed store.
pub async fn init() -> Result<()> {
    let s3_config = aws_config().await;
    let store = S3Store::new(Client::new(&s3_config));
    CURRENT
        .set(store)
        .map_err(|_| anyhow!("client::CURRENT was already initialized"))
}

/// Get the current S3-backed store, or panic if it hasn't been
/// initialized.
pub fn current() -> &'static S3Store {
    CURRENT.get().expect("client is not initialized")
}
