use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::CaptureUpload;
use crate::identity::IdentityStore;
use crate::metrics::SyncDelta;

const REQUEST_TIMEOUT_SECS: u64 = 20;
const SESSION_COOKIE: &str = "wp_session";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffProfile {
    pub staff_id: String,
}

/// Everything the agent says to the remote service goes through this seam,
/// so tests can substitute an in-memory fake.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn push_metrics(&self, delta: &SyncDelta) -> Result<()>;
    async fn upload_screenshot(&self, upload: CaptureUpload) -> Result<()>;
    async fn fetch_profile(&self) -> Result<StaffProfile>;
}

/// HTTP implementation of the remote contract. Auth rides as a session
/// cookie resolved from the identity store at call time, so calls made
/// before login simply go out unauthenticated and fail as transient.
pub struct HttpRemote {
    client: Client,
    base_url: String,
    identity: IdentityStore,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, identity: IdentityStore) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
        })
    }

    async fn cookie_header(&self) -> Option<String> {
        self.identity
            .credential()
            .await
            .map(|credential| format!("{SESSION_COOKIE}={credential}"))
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn push_metrics(&self, delta: &SyncDelta) -> Result<()> {
        let mut request = self
            .client
            .post(format!("{}/metrics", self.base_url))
            .json(delta);
        if let Some(cookie) = self.cookie_header().await {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request.send().await.context("metrics request failed")?;
        if !response.status().is_success() {
            bail!("metrics sync rejected: {}", response.status());
        }
        Ok(())
    }

    async fn upload_screenshot(&self, upload: CaptureUpload) -> Result<()> {
        let file_name = format!("display-{}.jpg", upload.display_index);
        let part = Part::bytes(upload.jpeg)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|err| anyhow!("invalid screenshot mime type: {err}"))?;

        let mut form = Form::new()
            .part("screenshot", part)
            .text("timestamp", upload.captured_at.to_rfc3339())
            .text("display", upload.display_label)
            .text("reason", upload.reason.as_str());
        if let Some(staff_id) = upload.staff_id {
            form = form.text("staffId", staff_id);
        }

        let mut request = self
            .client
            .post(format!("{}/screenshots", self.base_url))
            .multipart(form);
        if let Some(cookie) = self.cookie_header().await {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request.send().await.context("screenshot upload failed")?;
        if !response.status().is_success() {
            bail!("screenshot upload rejected: {}", response.status());
        }
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<StaffProfile> {
        let mut request = self.client.get(format!("{}/profile", self.base_url));
        if let Some(cookie) = self.cookie_header().await {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request.send().await.context("profile request failed")?;
        if !response.status().is_success() {
            bail!("profile request rejected: {}", response.status());
        }

        response
            .json::<StaffProfile>()
            .await
            .context("profile response was not valid JSON")
    }
}
