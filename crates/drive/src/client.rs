//! Paginated access to a remote document library.
//!
//! [`RemoteTree`] is the seam the crawler and fetcher depend on; [`GraphClient`]
//! implements it over the Microsoft Graph drive API. The client holds no
//! business logic: it lists one page of children, follows opaque continuation
//! links and downloads bytes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use arbor_core::config::GraphConfig;
use arbor_core::{DownloadRef, FolderNode};

use crate::error::DriveError;

/// One child of a folder as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub size: u64,
    /// Time-limited direct download URL (files only).
    pub download_url: Option<String>,
    pub mime_type: Option<String>,
}

impl RemoteEntry {
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: true,
            size: 0,
            download_url: None,
            mime_type: None,
        }
    }

    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: false,
            size: 0,
            download_url: None,
            mime_type: None,
        }
    }
}

/// A page of children plus the token for the next page, if any.
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    pub entries: Vec<RemoteEntry>,
    pub next: Option<String>,
}

/// Trait for remote folder trees (Graph drives, fakes in tests).
#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// List one page of `folder`'s children. `continuation` is the `next`
    /// token of the previous page, `None` for the first page.
    async fn list_children(
        &self,
        folder: &FolderNode,
        continuation: Option<&str>,
    ) -> Result<ChildPage, DriveError>;

    /// Download a file's bytes in full.
    async fn download(&self, reference: &DownloadRef) -> Result<Vec<u8>, DriveError>;
}

/// Bearer credential handed over by the token collaborator.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Utc::now())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A document library of a site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "driveType")]
    pub drive_type: Option<String>,
    #[serde(default, rename = "webUrl")]
    pub web_url: Option<String>,
}

// ── Wire format ───────────────────────────────────────────────

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct DriveItem {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<u64>,
    folder: Option<serde_json::Value>,
    file: Option<FileFacet>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct FileFacet {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct SiteResponse {
    id: String,
}

impl From<DriveItem> for RemoteEntry {
    fn from(item: DriveItem) -> Self {
        let is_folder = item.folder.is_some();
        Self {
            id: item.id,
            name: item.name,
            is_folder,
            size: item.size.unwrap_or(0),
            download_url: if is_folder { None } else { item.download_url },
            mime_type: item.file.and_then(|f| f.mime_type),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, DriveError> {
    serde_json::from_slice(body).map_err(|e| DriveError::Decode(e.to_string()))
}

fn parse_drives(body: &[u8]) -> Result<Vec<DriveInfo>, DriveError> {
    let list: ListResponse<DriveInfo> = decode(body)?;
    Ok(list.value)
}

fn parse_page(body: &[u8]) -> Result<ChildPage, DriveError> {
    let resp: ListResponse<DriveItem> = decode(body)?;
    Ok(ChildPage {
        entries: resp.value.into_iter().map(RemoteEntry::from).collect(),
        next: resp.next_link,
    })
}

// ── Graph client ──────────────────────────────────────────────

/// Microsoft Graph drive client.
///
/// All requests pass through a shared admission gate so concurrent workers
/// stay within the API's rate limits.
pub struct GraphClient {
    client: Client,
    base_url: String,
    drive_id: String,
    token: AccessToken,
    page_size: u32,
    gate: Arc<Semaphore>,
}

impl GraphClient {
    pub fn new(
        base_url: impl Into<String>,
        drive_id: impl Into<String>,
        token: AccessToken,
    ) -> Result<Self, DriveError> {
        Self::with_timeout(base_url, drive_id, token, Duration::from_secs(60))
    }

    fn with_timeout(
        base_url: impl Into<String>,
        drive_id: impl Into<String>,
        token: AccessToken,
        timeout: Duration,
    ) -> Result<Self, DriveError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| DriveError::Config(format!("bad base url: {e}")))?;
        if token.is_expired() {
            warn!(expires_at = ?token.expires_at(), "access token already expired; requests will fail");
        }
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| DriveError::Config(format!("cannot build HTTP client: {e}")))?,
            base_url,
            drive_id: drive_id.into(),
            token,
            page_size: 200,
            gate: Arc::new(Semaphore::new(4)),
        })
    }

    /// Build from the `graph` config section; token and drive id are required.
    pub fn from_config(config: &GraphConfig) -> Result<Self, DriveError> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| DriveError::Config("GRAPH_TOKEN is not set".into()))?;
        let drive_id = config
            .drive_id
            .clone()
            .ok_or_else(|| DriveError::Config("GRAPH_DRIVE_ID is not set".into()))?;
        let client = Self::with_timeout(
            config.base_url.clone(),
            drive_id,
            AccessToken::new(token, config.token_expires_at),
            config.timeout(),
        )?
        .with_page_size(config.page_size)
        .with_max_concurrent_requests(config.max_concurrent_requests);
        Ok(client)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 999);
        self
    }

    pub fn with_max_concurrent_requests(mut self, n: usize) -> Self {
        self.gate = Arc::new(Semaphore::new(n.max(1)));
        self
    }

    pub fn drive_id(&self) -> &str {
        &self.drive_id
    }

    /// URL of the first page of a folder's children.
    fn children_url(&self, folder: &FolderNode) -> Result<Url, DriveError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DriveError::Config(format!("bad base url: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| DriveError::Config("base url cannot be a base".into()))?;
            segments.pop_if_empty().push("drives").push(&self.drive_id);
            match (&folder.id, folder.is_root()) {
                (Some(id), _) => {
                    segments.push("items").push(id).push("children");
                }
                (None, true) => {
                    segments.push("root").push("children");
                }
                (None, false) => {
                    // root:/A/B:/children
                    let path = folder.path();
                    segments.push("root:");
                    let last = path.len() - 1;
                    for (i, name) in path.iter().enumerate() {
                        if i == last {
                            segments.push(&format!("{name}:"));
                        } else {
                            segments.push(name);
                        }
                    }
                    segments.push("children");
                }
            }
        }
        url.query_pairs_mut()
            .append_pair("$top", &self.page_size.to_string());
        Ok(url)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token.secret)
    }

    /// Send through the admission gate and map non-success statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| DriveError::Transport("admission gate closed".into()))?;
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();
        Err(DriveError::from_status(status, &body, retry_after))
    }

    /// List the document libraries of a site.
    pub async fn list_drives(&self, site_id: &str) -> Result<Vec<DriveInfo>, DriveError> {
        let url = self.api_url(&format!("sites/{}/drives", site_id));
        let response = self.send(self.authorized(self.client.get(url))).await?;
        let body = response.bytes().await?;
        parse_drives(&body)
    }

    /// Resolve `https://host/sites/name` into the site id used by the API.
    pub async fn resolve_site(&self, site_url: &str) -> Result<String, DriveError> {
        let path = site_lookup_path(site_url)?;
        let response = self
            .send(self.authorized(self.client.get(self.api_url(&path))))
            .await?;
        let body = response.bytes().await?;
        let site: SiteResponse = decode(&body)?;
        Ok(site.id)
    }

    /// Cheap authenticated call that validates the token against the drive.
    pub async fn verify_access(&self) -> Result<DriveInfo, DriveError> {
        let url = self.api_url(&format!("drives/{}", self.drive_id));
        let response = self.send(self.authorized(self.client.get(url))).await?;
        let body = response.bytes().await?;
        decode(&body)
    }
}

/// `https://contoso.sharepoint.com/sites/Ops` -> `sites/contoso.sharepoint.com:/sites/Ops`
fn site_lookup_path(site_url: &str) -> Result<String, DriveError> {
    let url = Url::parse(site_url).map_err(|e| DriveError::Config(format!("bad site url: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| DriveError::Config(format!("site url has no host: {site_url}")))?;
    let path = url.path().trim_end_matches('/');
    if !path.starts_with("/sites/") {
        return Err(DriveError::Config(format!(
            "site url must look like https://host/sites/name: {site_url}"
        )));
    }
    Ok(format!("sites/{}:{}", host, path))
}

#[async_trait]
impl RemoteTree for GraphClient {
    async fn list_children(
        &self,
        folder: &FolderNode,
        continuation: Option<&str>,
    ) -> Result<ChildPage, DriveError> {
        let url = match continuation {
            Some(next) => Url::parse(next).map_err(|e| DriveError::Decode(format!("bad next link: {e}")))?,
            None => self.children_url(folder)?,
        };
        debug!(folder = %folder.path().join("/"), url = %url, "listing children");
        let response = self.send(self.authorized(self.client.get(url))).await?;
        let body = response.bytes().await?;
        parse_page(&body)
    }

    async fn download(&self, reference: &DownloadRef) -> Result<Vec<u8>, DriveError> {
        let request = match reference {
            // Pre-authenticated; the bearer token is not needed and not sent.
            DownloadRef::Direct(url) => self.client.get(url),
            DownloadRef::Item(id) => self.authorized(
                self.client
                    .get(self.api_url(&format!("drives/{}/items/{}/content", self.drive_id, id))),
            ),
        };
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
