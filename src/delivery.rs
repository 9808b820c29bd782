//! Delivery of encoded thumbnails.
//!
//! The pipeline depends on one operation, [`Delivery::store`]: put these
//! bytes under this key and say where they can be retrieved. Keys are built
//! by [`DeliveryKey`], which owns the naming policy (caller prefix, random
//! UUID stem, format extension) and rejects anything that could escape the
//! storage root.
//!
//! Three backends ship with the crate: [`LocalDelivery`] writes under a root
//! directory, [`BunnyDelivery`] uploads to Bunny Storage over its HTTP API
//! and [`S3Delivery`] puts objects into an S3 (or S3-compatible) bucket.
//! [`DeliveryConfig`] picks one the same way the deployment environment
//! does.

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use aws_sdk_s3::{
    Client as S3Client,
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use uuid::Uuid;

use crate::{error::ThumbnailError, output::OutputFormat};

/// Prefix used when the caller supplies none.
pub const DEFAULT_KEY_PREFIX: &str = "thumbnails/";

/// Root directory of [`LocalDelivery`] when none is configured.
pub const DEFAULT_LOCAL_ROOT: &str = "media";

/// Bunny Storage endpoint used when no regional host is configured.
pub const DEFAULT_BUNNY_HOST: &str = "storage.bunnycdn.com";

/// S3 region used when none is configured.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// A validated, relative storage key such as `thumbnails/<uuid>.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    key: String,
    format: OutputFormat,
}

impl DeliveryKey {
    /// A fresh key under `prefix` (default [`DEFAULT_KEY_PREFIX`]) with a
    /// random UUID v4 stem.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::InvalidRequest`] if the prefix contains `..` or a
    /// non-relative component. Leading and trailing slashes are ignored.
    pub fn generate(prefix: Option<&str>, format: OutputFormat) -> Result<Self, ThumbnailError> {
        let stem = Uuid::new_v4().to_string();
        Self::with_stem(prefix, &stem, format)
    }

    /// A key under `prefix` with a caller-chosen stem.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::InvalidRequest`] if the prefix or stem is unsafe,
    /// or the stem is blank or contains a path separator.
    pub fn with_stem(prefix: Option<&str>, stem: &str, format: OutputFormat) -> Result<Self, ThumbnailError> {
        let stem = stem.trim();
        if stem.is_empty() || stem.contains(['/', '\\']) || stem == "." || stem == ".." {
            return Err(ThumbnailError::InvalidRequest(format!("invalid key stem {stem:?}")));
        }

        let prefix = prefix.unwrap_or(DEFAULT_KEY_PREFIX).trim().trim_matches('/');
        validate_relative(prefix)?;

        let key = if prefix.is_empty() {
            format!("{stem}.{}", format.extension())
        } else {
            format!("{prefix}/{stem}.{}", format.extension())
        };
        validate_relative(&key)?;
        Ok(Self { key, format })
    }

    /// The key as a `/`-separated relative path.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// MIME type of the content stored under this key.
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

impl Display for DeliveryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.key)
    }
}

/// Reject Windows separators, `..` and anything that is not a plain
/// relative component.
fn validate_relative(key: &str) -> Result<(), ThumbnailError> {
    let unsafe_key = key.contains('\\')
        || key.split('/').any(|segment| segment == "..")
        || Path::new(key)
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if unsafe_key {
        return Err(ThumbnailError::InvalidRequest(format!(
            "key {key:?} must be a relative path without '..'"
        )));
    }
    Ok(())
}

/// Stores encoded thumbnails and reports where they ended up.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Store `bytes` under `key`.
    ///
    /// Returns a retrievable reference: a URL or a local path. Failures are
    /// reported once, as [`ThumbnailError::Delivery`]; no retries happen here.
    async fn store(&self, bytes: Vec<u8>, key: &DeliveryKey) -> Result<String, ThumbnailError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Writes thumbnails under a root directory.
#[derive(Debug, Clone)]
pub struct LocalDelivery {
    root: PathBuf,
}

impl LocalDelivery {
    /// Deliver under `root`. The directory is created on first store.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `key` lives on disk.
    pub fn path_for(&self, key: &DeliveryKey) -> PathBuf {
        key.as_str()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl Delivery for LocalDelivery {
    async fn store(&self, bytes: Vec<u8>, key: &DeliveryKey) -> Result<String, ThumbnailError> {
        let destination = self.path_for(key);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                ThumbnailError::Delivery(format!("creating {}: {error}", parent.display()))
            })?;
        }

        // Write to a per-request temporary name, then rename into place, so
        // readers never observe a partial file.
        let staging = destination.with_extension(format!("{}.part", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, &bytes).await.map_err(|error| {
            ThumbnailError::Delivery(format!("writing {}: {error}", staging.display()))
        })?;
        if let Err(error) = tokio::fs::rename(&staging, &destination).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(ThumbnailError::Delivery(format!(
                "moving into {}: {error}",
                destination.display()
            )));
        }

        let reference = destination.to_string_lossy().replace('\\', "/");
        log::debug!("Stored {} bytes at {reference}", bytes.len());
        Ok(reference)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Bunny Storage credentials and addressing.
#[derive(Clone)]
#[must_use]
pub struct BunnyConfig {
    /// Storage zone name.
    pub storage_zone: String,
    /// Storage API password (`AccessKey` header).
    pub access_key: String,
    /// Regional storage host, e.g. `ny.storage.bunnycdn.com`.
    pub region_host: String,
    /// Public pull-zone base URL; when unset, references point at the
    /// storage API itself.
    pub cdn_base_url: Option<String>,
}

impl Debug for BunnyConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BunnyConfig")
            .field("storage_zone", &self.storage_zone)
            .field("access_key", &"<redacted>")
            .field("region_host", &self.region_host)
            .field("cdn_base_url", &self.cdn_base_url)
            .finish()
    }
}

impl BunnyConfig {
    /// Credentials for `storage_zone` on the default host.
    pub fn new(storage_zone: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            storage_zone: storage_zone.into(),
            access_key: access_key.into(),
            region_host: DEFAULT_BUNNY_HOST.to_string(),
            cdn_base_url: None,
        }
    }

    /// Use a regional storage host.
    pub fn with_region_host(mut self, host: impl Into<String>) -> Self {
        self.region_host = host.into();
        self
    }

    /// Build public references from `base_url`.
    pub fn with_cdn_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.cdn_base_url = Some(base_url.into());
        self
    }

    /// Storage API URL for `key`. A host given with a scheme is used as is.
    pub fn storage_url(&self, key: &DeliveryKey) -> String {
        let host = self.region_host.trim_end_matches('/');
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        format!("{base}/{}/{}", self.storage_zone, key.as_str().trim_start_matches('/'))
    }

    /// Public reference for `key`.
    pub fn public_url(&self, key: &DeliveryKey) -> String {
        match &self.cdn_base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                key.as_str().trim_start_matches('/')
            ),
            None => self.storage_url(key),
        }
    }
}

/// Uploads thumbnails to Bunny Storage with HTTP `PUT`.
#[derive(Debug, Clone)]
pub struct BunnyDelivery {
    client: Client,
    config: BunnyConfig,
}

impl BunnyDelivery {
    /// Create an uploader.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::Configuration`] if the zone or key is blank or the
    /// HTTP client cannot be built.
    pub fn new(config: BunnyConfig) -> Result<Self, ThumbnailError> {
        if config.storage_zone.trim().is_empty() || config.access_key.trim().is_empty() {
            return Err(ThumbnailError::Configuration(
                "Bunny Storage needs both a storage zone and an access key".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|error| ThumbnailError::Configuration(error.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Delivery for BunnyDelivery {
    async fn store(&self, bytes: Vec<u8>, key: &DeliveryKey) -> Result<String, ThumbnailError> {
        let url = self.config.storage_url(key);
        let size = bytes.len();
        log::debug!("Uploading {size} bytes to {url}");

        let response = self
            .client
            .put(&url)
            .header("AccessKey", &self.config.access_key)
            .header(CONTENT_TYPE, key.content_type())
            .body(bytes)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(self.config.public_url(key)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ThumbnailError::Delivery(format!(
                    "Bunny upload answered {status}: {body}"
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        "bunny"
    }
}

/// S3 bucket, credentials and addressing.
#[derive(Clone)]
#[must_use]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Bucket region.
    pub region: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2); requests then
    /// use path-style addressing.
    pub endpoint_url: Option<String>,
    /// Public CDN base URL in front of the bucket.
    pub cdn_base_url: Option<String>,
    /// Upload with the `public-read` canned ACL.
    pub public_read: bool,
}

impl Debug for S3Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint_url", &self.endpoint_url)
            .field("cdn_base_url", &self.cdn_base_url)
            .field("public_read", &self.public_read)
            .finish()
    }
}

impl S3Config {
    /// `bucket` in [`DEFAULT_S3_REGION`], public-read, no credentials yet.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: DEFAULT_S3_REGION.to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint_url: None,
            cdn_base_url: None,
            public_read: true,
        }
    }

    /// Use `region`.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Static credentials.
    pub fn with_credentials(mut self, access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        self.access_key_id = access_key_id.into();
        self.secret_access_key = secret_access_key.into();
        self
    }

    /// Talk to an S3-compatible endpoint instead of AWS.
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Build public references from `base_url`.
    pub fn with_cdn_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.cdn_base_url = Some(base_url.into());
        self
    }

    /// Upload with or without the `public-read` ACL.
    pub fn with_public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }

    /// Public reference for `key`: the CDN when configured, the custom
    /// endpoint (path style) when set, else the virtual-hosted AWS URL.
    pub fn public_url(&self, key: &DeliveryKey) -> String {
        let key = key.as_str().trim_start_matches('/');
        match (&self.cdn_base_url, &self.endpoint_url) {
            (Some(base), _) => format!("{}/{key}", base.trim_end_matches('/')),
            (None, Some(endpoint)) => format!("{}/{}/{key}", endpoint.trim_end_matches('/'), self.bucket),
            (None, None) => format!("https://{}.s3.amazonaws.com/{key}", self.bucket),
        }
    }
}

/// Uploads thumbnails to an S3 bucket with `PutObject`.
#[derive(Debug, Clone)]
pub struct S3Delivery {
    client: S3Client,
    config: S3Config,
}

impl S3Delivery {
    /// Create an uploader.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::Configuration`] if the bucket or either credential
    /// is blank.
    pub fn new(config: S3Config) -> Result<Self, ThumbnailError> {
        if config.bucket.trim().is_empty() {
            return Err(ThumbnailError::Configuration(
                "S3 delivery needs a bucket (THUMB_S3_BUCKET)".to_string(),
            ));
        }
        if config.access_key_id.trim().is_empty() || config.secret_access_key.trim().is_empty() {
            return Err(ThumbnailError::Configuration(
                "S3 delivery needs AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".to_string(),
            ));
        }

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "clip-thumbnailer",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint_url) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url.clone()).force_path_style(true);
        }
        let client = S3Client::from_conf(builder.build());
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Delivery for S3Delivery {
    async fn store(&self, bytes: Vec<u8>, key: &DeliveryKey) -> Result<String, ThumbnailError> {
        log::debug!("Uploading {} bytes to s3://{}/{key}", bytes.len(), self.config.bucket);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key.as_str())
            .content_type(key.content_type())
            .body(ByteStream::from(bytes));
        if self.config.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }
        request.send().await.map_err(|error| {
            ThumbnailError::Delivery(format!(
                "S3 upload of {key} to {} failed: {}",
                self.config.bucket,
                DisplayErrorContext(&error)
            ))
        })?;
        Ok(self.config.public_url(key))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

/// Which delivery backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Bunny when its credentials are present, else S3 when a bucket is
    /// configured, else local.
    #[default]
    Auto,
    /// [`LocalDelivery`].
    Local,
    /// [`BunnyDelivery`].
    Bunny,
    /// [`S3Delivery`].
    S3,
}

impl FromStr for BackendKind {
    type Err = ThumbnailError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(BackendKind::Auto),
            "local" => Ok(BackendKind::Local),
            "bunny" => Ok(BackendKind::Bunny),
            "s3" => Ok(BackendKind::S3),
            other => Err(ThumbnailError::Configuration(format!(
                "unknown delivery backend {other:?} (expected auto, local, bunny or s3)"
            ))),
        }
    }
}

/// Delivery backend selection.
#[derive(Debug, Clone)]
#[must_use]
pub struct DeliveryConfig {
    /// Requested backend.
    pub backend: BackendKind,
    /// Root directory for [`LocalDelivery`].
    pub local_root: PathBuf,
    /// Bunny credentials, if any.
    pub bunny: Option<BunnyConfig>,
    /// S3 bucket and credentials, if any.
    pub s3: Option<S3Config>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            local_root: PathBuf::from(DEFAULT_LOCAL_ROOT),
            bunny: None,
            s3: None,
        }
    }
}

impl DeliveryConfig {
    /// Auto selection with the default local root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the local root.
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = root.into();
        self
    }

    /// Provide Bunny credentials.
    pub fn with_bunny(mut self, bunny: BunnyConfig) -> Self {
        self.bunny = Some(bunny);
        self
    }

    /// Provide an S3 bucket and credentials.
    pub fn with_s3(mut self, s3: S3Config) -> Self {
        self.s3 = Some(s3);
        self
    }

    /// The backend [`build`](Self::build) will construct: an explicit
    /// choice as given, otherwise Bunny, then S3, then local, depending on
    /// which settings are present.
    pub fn resolved_backend(&self) -> BackendKind {
        match self.backend {
            BackendKind::Auto if self.bunny_settings().is_some() => BackendKind::Bunny,
            BackendKind::Auto if self.s3_settings().is_some() => BackendKind::S3,
            BackendKind::Auto => BackendKind::Local,
            forced => forced,
        }
    }

    fn bunny_settings(&self) -> Option<BunnyConfig> {
        self.bunny.clone().filter(|bunny| {
            !bunny.storage_zone.trim().is_empty() && !bunny.access_key.trim().is_empty()
        })
    }

    fn s3_settings(&self) -> Option<S3Config> {
        self.s3.clone().filter(|s3| !s3.bucket.trim().is_empty())
    }

    /// Construct the selected backend.
    ///
    /// # Errors
    ///
    /// [`ThumbnailError::Configuration`] if Bunny or S3 is selected without
    /// its settings or the settings are unusable.
    pub fn build(&self) -> Result<Arc<dyn Delivery>, ThumbnailError> {
        let delivery: Arc<dyn Delivery> = match self.resolved_backend() {
            BackendKind::Bunny => {
                let bunny = self.bunny_settings().ok_or_else(|| {
                    ThumbnailError::Configuration(
                        "Bunny delivery selected but BUNNY_STORAGE_ZONE / BUNNY_ACCESS_KEY are not set"
                            .to_string(),
                    )
                })?;
                Arc::new(BunnyDelivery::new(bunny)?)
            }
            BackendKind::S3 => {
                let s3 = self.s3_settings().ok_or_else(|| {
                    ThumbnailError::Configuration(
                        "S3 delivery selected but THUMB_S3_BUCKET is not set".to_string(),
                    )
                })?;
                Arc::new(S3Delivery::new(s3)?)
            }
            BackendKind::Local | BackendKind::Auto => Arc::new(LocalDelivery::new(self.local_root.clone())),
        };
        log::info!("Using {} delivery", delivery.name());
        Ok(delivery)
    }
}
