//! REST client for the PolloPollo API.
//!
//! All endpoints speak JSON over HTTPS.  Mutating endpoints require a bearer
//! token; listing endpoints are public.  Failures are terminal: a non-2xx
//! response becomes [`ClientError::Api`] carrying the user-facing message from
//! the per-endpoint table, and no request is ever retried.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::cache::{ListKind, PageQuery};
use crate::config::Config;
use crate::errors::{user_message, ClientError, Endpoint, Result};
use crate::types::{Application, StatusUpdate};

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

/// Every listing endpoint returns the page plus the total count for the query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub applications: Vec<Application>,
    pub count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationsResponse {
    pub locations: Vec<String>,
}

// ─────────────────────────────────────────────────────────
// Source seam
// ─────────────────────────────────────────────────────────

/// The fetching capability the listing and donation flows depend on.
///
/// [`ApiClient`] is the production implementation; tests substitute an
/// in-memory one.
#[async_trait]
pub trait ApplicationSource {
    /// Fetch one page of a listing.  Returns `(applications, total_count)`.
    async fn fetch_page(&self, query: &PageQuery) -> Result<(Vec<Application>, u64)>;

    /// Fetch a single application by id.  This is the cache-bypassing fresh
    /// read used before locking.
    async fn fetch_by_id(&self, application_id: u64) -> Result<Application>;

    /// Countries that currently have open applications.
    async fn fetch_countries(&self) -> Result<Vec<String>>;

    /// Cities within `country` that currently have open applications.
    async fn fetch_cities(&self, country: &str) -> Result<Vec<String>>;
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

pub struct ApiClient {
    http: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    /// Issue the `PUT /applications` status transition.
    pub async fn update_status(&self, update: &StatusUpdate) -> Result<Application> {
        let url = format!("{}/applications", self.base_url);
        debug!(
            "PUT {url} — application {} -> {}",
            update.application_id,
            update.status.as_str()
        );
        let resp = self
            .authed(self.http.put(&url))?
            .json(update)
            .send()
            .await?;
        let resp = check(resp, Endpoint::UpdateStatus).await?;
        Ok(resp.json().await?)
    }

    /// `DELETE /applications/{userId}/{applicationId}`.
    pub async fn delete_application(&self, user_id: u64, application_id: u64) -> Result<()> {
        let url = format!("{}/applications/{user_id}/{application_id}", self.base_url);
        debug!("DELETE {url}");
        let resp = self.authed(self.http.delete(&url))?.send().await?;
        check(resp, Endpoint::DeleteApplication).await?;
        Ok(())
    }

    /// `POST /applications/withdraw/{producerId}/{applicationId}`.
    pub async fn withdraw_bytes(&self, producer_id: u64, application_id: u64) -> Result<()> {
        let url = format!(
            "{}/applications/withdraw/{producer_id}/{application_id}",
            self.base_url
        );
        debug!("POST {url}");
        let resp = self.authed(self.http.post(&url))?.send().await?;
        check(resp, Endpoint::WithdrawBytes).await?;
        Ok(())
    }

    /// `POST /applications/{receiverId}/{applicationId}`.
    pub async fn confirm_receival(&self, receiver_id: u64, application_id: u64) -> Result<()> {
        let url = format!(
            "{}/applications/{receiver_id}/{application_id}",
            self.base_url
        );
        debug!("POST {url}");
        let resp = self.authed(self.http.post(&url))?.send().await?;
        check(resp, Endpoint::ConfirmReceival).await?;
        Ok(())
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.bearer_token.as_deref().ok_or_else(|| {
            ClientError::Config("BEARER_TOKEN is required for this endpoint".to_string())
        })?;
        Ok(builder.bearer_auth(token))
    }
}

#[async_trait]
impl ApplicationSource for ApiClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<(Vec<Application>, u64)> {
        let url = format!("{}{}", self.base_url, page_path(query));
        debug!("GET {url}");
        let resp = self.http.get(&url).send().await?;
        let resp = check(resp, Endpoint::ListApplications).await?;
        let body: ListResponse = resp.json().await?;
        Ok((body.applications, body.count))
    }

    async fn fetch_by_id(&self, application_id: u64) -> Result<Application> {
        let url = format!("{}/applications/{application_id}", self.base_url);
        debug!("GET {url}");
        let resp = self.http.get(&url).send().await?;
        let resp = check(resp, Endpoint::GetApplication).await?;
        Ok(resp.json().await?)
    }

    async fn fetch_countries(&self) -> Result<Vec<String>> {
        let url = format!("{}/applications/countries", self.base_url);
        debug!("GET {url}");
        let resp = self.http.get(&url).send().await?;
        let resp = check(resp, Endpoint::ListLocations).await?;
        let body: LocationsResponse = resp.json().await?;
        Ok(body.locations)
    }

    async fn fetch_cities(&self, country: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/applications/cities?country={}",
            self.base_url,
            urlencoding::encode(country)
        );
        debug!("GET {url}");
        let resp = self.http.get(&url).send().await?;
        let resp = check(resp, Endpoint::ListLocations).await?;
        let body: LocationsResponse = resp.json().await?;
        Ok(body.locations)
    }
}

/// Path + query string for a page fetch, relative to the base URL.
pub fn page_path(query: &PageQuery) -> String {
    match &query.kind {
        ListKind::Open => format!(
            "/applications?offset={}&amount={}",
            query.offset, query.limit
        ),
        ListKind::Completed => format!(
            "/applications/completed?offset={}&amount={}",
            query.offset, query.limit
        ),
        ListKind::Filtered { country, city } => {
            let mut path = format!(
                "/applications/filtered?offset={}&amount={}&country={}",
                query.offset,
                query.limit,
                urlencoding::encode(country)
            );
            if let Some(city) = city {
                path.push_str("&city=");
                path.push_str(&urlencoding::encode(city));
            }
            path
        }
    }
}

/// Turn a non-2xx response into [`ClientError::Api`] with the table message.
async fn check(resp: Response, endpoint: Endpoint) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(api_error(endpoint, status))
}

fn api_error(endpoint: Endpoint, status: StatusCode) -> ClientError {
    ClientError::Api {
        status: status.as_u16(),
        message: user_message(endpoint, status.as_u16()).map(String::from),
    }
}
