//! Known-faces roster and reference-image downloads.

use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FetchError, FetchResult};

pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];
const MAX_REDIRECTS: usize = 10;

/// One identity and the URLs of its reference photos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub label: String,
    #[serde(default)]
    pub image_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RosterPayload {
    #[serde(default)]
    faces: Vec<RosterEntry>,
}

/// Parse a known-faces payload. A missing `faces` key is an empty roster.
pub fn parse_roster(body: &str) -> serde_json::Result<Vec<RosterEntry>> {
    serde_json::from_str::<RosterPayload>(body).map(|p| p.faces)
}

/// Returns the parsed URL if it points at a reference image we can use.
///
/// Placeholder entries (`/.keep`) and anything without an image extension are
/// rejected. Only the path is inspected, so query strings and fragments on
/// pre-signed URLs do not matter.
pub fn accepted_image_url(raw: &str) -> Option<Url> {
    if raw.contains("/.keep") {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    let path = url.path().to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(ext))
        .then_some(url)
}

/// HTTP client for the roster endpoint and the object store behind it.
#[derive(Debug, Clone)]
pub struct RosterClient {
    http: Client,
    roster_url: Url,
}

impl RosterClient {
    pub fn new(roster_url: &str, timeout: Duration) -> Result<Self> {
        let roster_url =
            Url::parse(roster_url).with_context(|| format!("invalid roster url {roster_url}"))?;

        // Following a redirect onto another origin is treated as a refusal.
        let policy = redirect::Policy::custom(|attempt| {
            let crossed = attempt
                .previous()
                .last()
                .is_some_and(|prev| prev.origin() != attempt.url().origin());
            if crossed {
                attempt.error("redirected to a different origin")
            } else if attempt.previous().len() > MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        });

        let http = Client::builder()
            .timeout(timeout)
            .redirect(policy)
            .build()
            .context("building http client")?;
        Ok(Self { http, roster_url })
    }

    pub fn roster_url(&self) -> &Url {
        &self.roster_url
    }

    async fn get(&self, url: &Url) -> FetchResult<reqwest::Response> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url.as_str(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url.as_str(), status));
        }
        Ok(response)
    }

    pub async fn fetch_roster(&self) -> FetchResult<Vec<RosterEntry>> {
        let url = &self.roster_url;
        let body = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|e| FetchError::from_transport(url.as_str(), e))?;
        let roster = parse_roster(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!("roster from {} lists {} identities", url, roster.len());
        Ok(roster)
    }

    pub async fn fetch_image(&self, url: &Url) -> FetchResult<Vec<u8>> {
        let response = self.get(url).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_transport(url.as_str(), e))?;
        debug!(
            "fetched {} ({} bytes, content-type {:?})",
            url,
            bytes.len(),
            content_type
        );
        Ok(bytes.to_vec())
    }
}
