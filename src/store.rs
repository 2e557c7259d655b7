//! Object store access.
//!
//! The invocation drivers talk to storage through the [`ObjectStore`]
//! trait; [`Client`] is the S3-compatible implementation used in
//! production (works against MinIO with an explicit endpoint URL).

use anyhow::Error;
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

/// Whole-object get/put, the only storage operations the pipeline needs.
/// Shard objects are written once and never mutated, so there is no
/// append or delete here.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, Error>;
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct ClientConfig {
    /// id
    pub access_key_id: String,

    /// password
    pub secret_access_key: String,

    /// object store region
    pub region: String,

    /// endpoint url, e.g. a local minio instance
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Client {
    pub client: s3::Client,
}

impl Client {
    pub fn from_conf(cfg: ClientConfig) -> Self {
        let cred = s3::config::Credentials::new(
            cfg.access_key_id,
            cfg.secret_access_key,
            None,
            None,
            "cfmr",
        );
        let region = s3::config::Region::new(cfg.region);
        let conf_builder = s3::config::Builder::new()
            .credentials_provider(cred)
            .region(region)
            .endpoint_url(cfg.url)
            .behavior_version_latest();
        let conf = conf_builder.build();

        Self {
            client: s3::Client::from_conf(conf),
        }
    }

    /// Wrap an already-configured SDK client, e.g. one built from the
    /// hosting runtime's ambient credentials.
    pub fn from_client(client: s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for Client {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, Error> {
        let data = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?
            .body
            .collect()
            .await?
            .into_bytes();
        Ok(data)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), Error> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await?;
        Ok(())
    }
}
