use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::Client;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::{Location, Transport};
use crate::error::IoError;

// =============================================================================
// S3Address
// =============================================================================

/// Coordinates of an object (or object prefix) in S3-compatible storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct S3Address {
    /// Service endpoint, `None` for the default AWS endpoint
    pub endpoint: Option<String>,
    /// Signing region
    pub region: String,
    pub bucket: String,
    /// Object key or key prefix (no leading or trailing `/`)
    pub key: String,
}

impl S3Address {
    /// Build an address from a bucket name and key as written in a descriptor.
    ///
    /// Bucket and key are joined and re-split on the first `/`, so a bucket
    /// name like `"bucket/project"` moves its tail into the key.
    pub fn new(
        endpoint: Option<String>,
        region: impl Into<String>,
        bucket_name: &str,
        key: &str,
    ) -> Self {
        let combined = format!("{}/{}", bucket_name, key);
        let (bucket, key) = split_bucket_and_key(&combined);
        Self {
            endpoint,
            region: region.into(),
            bucket,
            key,
        }
    }

    /// Derive an address from an `s3://bucket/key` or `https://endpoint/bucket/key` URL.
    pub fn from_url(url: &Url, region: &str) -> Result<Self, IoError> {
        let host = url
            .host_str()
            .ok_or_else(|| IoError::InvalidLocation(format!("no host in {}", url)))?;

        let (endpoint, combined) = match url.scheme() {
            "s3" => (None, format!("{}{}", host, url.path())),
            "http" | "https" => match virtual_hosted_bucket(host) {
                Some(bucket) => (None, format!("{}{}", bucket, url.path())),
                None => {
                    let endpoint = match url.port() {
                        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                        None => format!("{}://{}", url.scheme(), host),
                    };
                    (Some(endpoint), url.path().to_string())
                }
            },
            other => {
                return Err(IoError::InvalidLocation(format!(
                    "unsupported scheme {:?} in {}",
                    other, url
                )))
            }
        };

        let (bucket, key) = split_bucket_and_key(&combined);
        if bucket.is_empty() {
            return Err(IoError::InvalidLocation(format!("no bucket in {}", url)));
        }

        Ok(Self {
            endpoint,
            region: region.to_string(),
            bucket,
            key,
        })
    }

    /// Address of `child` beneath this key prefix.
    pub fn child(&self, child: &str) -> Self {
        let child = child.trim_matches('/');
        let key = if self.key.is_empty() {
            child.to_string()
        } else {
            format!("{}/{}", self.key, child)
        };
        Self {
            key,
            ..self.clone()
        }
    }

    /// Address of the key prefix containing this key.
    pub fn parent(&self) -> Self {
        let key = match self.key.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        Self {
            key,
            ..self.clone()
        }
    }

    /// Identifier for logging, e.g. `s3://bucket/key`.
    pub fn identifier(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// URL form of the address. The signing region is not part of it.
impl fmt::Display for S3Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Some(endpoint) => write!(
                f,
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                self.key
            ),
            None => write!(f, "s3://{}/{}", self.bucket, self.key),
        }
    }
}

/// Bucket of an AWS virtual-hosted URL host such as
/// `bucket.s3.amazonaws.com` or `bucket.s3.eu-west-1.amazonaws.com`.
fn virtual_hosted_bucket(host: &str) -> Option<&str> {
    let (bucket, service) = host.split_once('.')?;
    let is_aws = service.ends_with("amazonaws.com")
        && (service.starts_with("s3.") || service.starts_with("s3-"));
    (is_aws && !bucket.is_empty()).then_some(bucket)
}

/// Split `"bucket/some/key"` into `("bucket", "some/key")`.
///
/// The first segment is always the bucket; the remainder is the key even when
/// it contains further separators.
pub fn split_bucket_and_key(combined: &str) -> (String, String) {
    let combined = combined.trim_start_matches('/');
    match combined.split_once('/') {
        Some((bucket, key)) => (
            bucket.to_string(),
            key.trim_matches('/').to_string(),
        ),
        None => (combined.to_string(), String::new()),
    }
}

// =============================================================================
// S3Transport
// =============================================================================

/// Clients are keyed by endpoint and signing region.
type ClientKey = (Option<String>, String);

/// S3-backed implementation of [`Transport`].
///
/// Reads whole objects from S3 or S3-compatible storage (MinIO, EMBL S3, ...).
/// One client is created per endpoint and signing region on first use and
/// reused afterwards. [`Location::Object`] addresses sign with their own
/// region; URLs sign with the transport's region.
pub struct S3Transport {
    region: String,
    anonymous: bool,
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl S3Transport {
    /// Create a transport signing requests for `region`.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            anonymous: false,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Skip credential resolution (public buckets).
    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn client(&self, address: &S3Address) -> Client {
        let mut clients = self.clients.lock().await;
        let key = client_key(address);
        if let Some(client) = clients.get(&key) {
            return client.clone();
        }

        let client = create_s3_client(
            address.endpoint.as_deref(),
            &address.region,
            self.anonymous,
        )
        .await;
        clients.insert(key, client.clone());
        client
    }

    fn address(&self, location: &Location) -> Result<S3Address, IoError> {
        match location {
            Location::Object(address) => Ok(address.clone()),
            Location::Url(url) => S3Address::from_url(url, &self.region),
            Location::Path(_) => Err(IoError::InvalidLocation(format!(
                "not an object location: {}",
                location
            ))),
        }
    }
}

fn client_key(address: &S3Address) -> ClientKey {
    (address.endpoint.clone(), address.region.clone())
}

#[async_trait]
impl Transport for S3Transport {
    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        let address = self.address(location)?;
        let client = self.client(&address).await;

        let resp = client
            .get_object()
            .bucket(&address.bucket)
            .key(&address.key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                classify_sdk_error(e, is_not_found, &address)
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        debug!(object = %address.identifier(), bytes = data.len(), "Read remote document");
        Ok(data)
    }

    async fn exists(&self, location: &Location) -> Result<bool, IoError> {
        if !location.is_remote() {
            return Ok(false);
        }
        let address = self.address(location)?;
        let client = self.client(&address).await;

        let result = client
            .head_object()
            .bucket(&address.bucket)
            .key(&address.key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                match classify_sdk_error(e, is_not_found, &address) {
                    IoError::NotFound(_) => Ok(false),
                    other => Err(other),
                }
            }
        }
    }
}

/// Map an SDK failure onto [`IoError`], recognising the many shapes of "404".
fn classify_sdk_error<E>(
    err: SdkError<E, HttpResponse>,
    service_not_found: bool,
    address: &S3Address,
) -> IoError
where
    E: std::error::Error + 'static,
{
    if service_not_found {
        return IoError::NotFound(address.identifier());
    }

    let status_is_404 = err
        .raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false);
    if status_is_404 {
        return IoError::NotFound(address.identifier());
    }

    let is_connection = matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    );
    let err_str = DisplayErrorContext(&err).to_string();

    if err_str.contains("NotFound") || err_str.contains("NoSuchKey") || err_str.contains("404") {
        return IoError::NotFound(address.identifier());
    }

    if is_connection {
        IoError::Connection(err_str)
    } else {
        IoError::S3(err_str)
    }
}

/// Create an S3 client with optional custom endpoint.
///
/// Custom endpoints (MinIO, institutional object stores) use path-style
/// addressing. With `anonymous` set, requests are sent unsigned.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str, anonymous: bool) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }
    if anonymous {
        config_loader = config_loader.no_credentials();
    }

    let sdk_config = config_loader.load().await;

    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
