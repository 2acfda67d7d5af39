//! Where uploaded photos live once an Admin submits them.
//!
//! [`CloudinaryHost`] pushes bytes to a Cloudinary account with a signed
//! upload. [`DirectoryHost`] keeps them on local disk and serves them under
//! `/media`, for deployments without Cloudinary credentials.

use crate::config::CloudinaryCredentials;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

/// URL prefix under which [`DirectoryHost`] files are served.
pub const MEDIA_PREFIX: &str = "/media";

#[derive(Error, Debug)]
pub enum HostError {
    #[error("image host request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image host returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("image host response carried no URL")]
    MissingUrl,
    #[error("failed to store image locally: {0}")]
    Io(#[from] std::io::Error),
}

/// Stores photo bytes and returns a URL a browser can load them from.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, HostError>;
}

/// Signed uploads to a Cloudinary account.
pub struct CloudinaryHost {
    client: Client,
    endpoint: String,
    credentials: CloudinaryCredentials,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl CloudinaryHost {
    /// Build a host using a reqwest client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(credentials: CloudinaryCredentials, timeout: Duration) -> Result<Self, reqwest::Error> {
        let endpoint = format!("{CLOUDINARY_API}/{}/image/upload", credentials.cloud_name);
        Self::with_endpoint(credentials, endpoint, timeout)
    }

    /// Like [`CloudinaryHost::new`] but posting to an arbitrary upload URL.
    pub fn with_endpoint(
        credentials: CloudinaryCredentials,
        endpoint: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }
}

/// Cloudinary request signature: hex SHA-256 of the sorted signed
/// parameters followed by the API secret.
fn sign(timestamp: i64, api_secret: &str) -> String {
    hex::encode(Sha256::digest(format!("timestamp={timestamp}{api_secret}").as_bytes()))
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, HostError> {
        let timestamp = chrono::Utc::now().timestamp();
        let size = bytes.len();
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name("upload"))
            .text("api_key", self.credentials.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", sign(timestamp, &self.credentials.api_secret));

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = response.json().await?;
        let url = parsed.secure_url.or(parsed.url).ok_or(HostError::MissingUrl)?;
        tracing::info!(size, url = %url, "uploaded image to cloudinary");
        Ok(url)
    }
}

/// Photos written to a local directory and served by the dashboard itself.
pub struct DirectoryHost {
    dir: PathBuf,
}

impl DirectoryHost {
    pub fn new(dir: PathBuf) -> Result<Self, HostError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl ImageHost for DirectoryHost {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, HostError> {
        let extension = image::guess_format(&bytes)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin");
        let file_name = format!("{}.{extension}", Uuid::new_v4().simple());

        tokio::fs::write(self.dir.join(&file_name), &bytes).await?;
        tracing::info!(size = bytes.len(), file = %file_name, "stored image locally");
        Ok(format!("{MEDIA_PREFIX}/{file_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::routing::post;
    use axum::{Json, Router};
    use suspectsight_core::testing::png_bytes;

    fn credentials() -> CloudinaryCredentials {
        CloudinaryCredentials {
            cloud_name: "demo".into(),
            api_key: "key-1".into(),
            api_secret: "secret".into(),
        }
    }

    #[test]
    fn test_signature_is_sha256_of_params_and_secret() {
        assert_eq!(
            sign(1_700_000_000, "secret"),
            "899037359ccfa6a61dabc0d9fbdd808ed945046e5d6451ab46bde7d4677d53b4"
        );
    }

    #[test]
    fn test_default_endpoint() {
        let host = CloudinaryHost::new(credentials(), Duration::from_secs(5)).unwrap();
        assert_eq!(host.endpoint, "https://api.cloudinary.com/v1_1/demo/image/upload");
    }

    async fn fake_cloudinary(mut multipart: Multipart) -> Json<serde_json::Value> {
        let mut fields = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let data = field.bytes().await.unwrap();
            fields.push((name, data.len()));
        }
        let names: Vec<_> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"file"));
        assert!(names.contains(&"signature"));
        Json(serde_json::json!({
            "url": "http://res.example/a.png",
            "secure_url": "https://res.example/a.png",
        }))
    }

    #[tokio::test]
    async fn test_cloudinary_upload_returns_secure_url() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/upload", post(fake_cloudinary));
        tokio::spawn(async move { axum::serve(listener, app).await });

        let host = CloudinaryHost::with_endpoint(
            credentials(),
            format!("http://{addr}/upload"),
            Duration::from_secs(5),
        )
        .unwrap();
        let url = host.upload(png_bytes([1, 2, 3], 4, 4)).await.unwrap();
        assert_eq!(url, "https://res.example/a.png");
    }

    #[tokio::test]
    async fn test_cloudinary_error_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/upload",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad signature") }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await });

        let host = CloudinaryHost::with_endpoint(
            credentials(),
            format!("http://{addr}/upload"),
            Duration::from_secs(5),
        )
        .unwrap();
        match host.upload(vec![1, 2, 3]).await {
            Err(HostError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad signature");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_directory_host_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let host = DirectoryHost::new(dir.path().join("media")).unwrap();
        let bytes = png_bytes([9, 9, 9], 4, 4);

        let url = host.upload(bytes.clone()).await.unwrap();
        assert!(url.starts_with("/media/"));
        assert!(url.ends_with(".png"));

        let file_name = url.trim_start_matches("/media/");
        assert_eq!(std::fs::read(host.dir().join(file_name)).unwrap(), bytes);
    }
}
