//!
//! HTTP client for the content workspace API.
//!
//! Pages are served per entity type under `{base}/entities/{key}/pages`, paginated with an opaque
//! cursor. Every request carries the integration token as a bearer credential. Status codes are
//! mapped onto `SourceError` so the retry layer can tell transient failures from bad requests.
//!
//! One `fetch_page` call is one request; the cursor walk lives in `ContentSource::fetch_all`.

use super::types::*;
use super::ContentSource;
use crate::config::SourceConfig;
use crate::sync::EntityType;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Content workspace HTTP client
#[derive(Clone)]
pub struct HttpContentSource {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the workspace API, without a trailing slash.
	base_url: String,
	token: String,
}

impl HttpContentSource {
	/// Create a new client from the source configuration.
	///
	/// # Errors
	/// Returns `SourceError::MissingCredentials` when no token is configured, or the builder
	/// error when the HTTP client cannot be created.
	pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
		let token = config
			.token
			.clone()
			.filter(|t| !t.trim().is_empty())
			.ok_or(SourceError::MissingCredentials)?;

		let http_client = Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_secs))
			.build()?;

		Ok(Self {
			http_client,
			base_url: config.base_url.trim_end_matches('/').to_string(),
			token,
		})
	}

	fn pages_url(&self, entity: EntityType) -> String {
		format!("{}/entities/{}/pages", self.base_url, entity.key())
	}

	async fn get(&self, url: &str, cursor: Option<&str>) -> Result<reqwest::Response, SourceError> {
		let mut request = self.http_client.get(url).bearer_auth(&self.token);
		if let Some(cursor) = cursor {
			request = request.query(&[("cursor", cursor)]);
		}

		debug!("Requesting {}", url);
		let response = request.send().await?;
		let status = response.status();

		if status == StatusCode::TOO_MANY_REQUESTS {
			let retry_after_secs = response
				.headers()
				.get("Retry-After")
				.and_then(|v| v.to_str().ok())
				.and_then(|v| v.parse().ok());
			warn!("Rate limited by content source at {}", url);
			return Err(SourceError::RateLimited { retry_after_secs });
		}

		if !status.is_success() && status != StatusCode::NOT_FOUND {
			let message = response.text().await.unwrap_or_default();
			return Err(SourceError::Status {
				status: status.as_u16(),
				message,
			});
		}

		Ok(response)
	}
}

#[async_trait::async_trait]
impl ContentSource for HttpContentSource {
	async fn fetch_page(
		&self,
		entity: EntityType,
		cursor: Option<&str>,
	) -> Result<PageBatch, SourceError> {
		let response = self.get(&self.pages_url(entity), cursor).await?;
		if response.status() == StatusCode::NOT_FOUND {
			return Err(SourceError::Status {
				status: 404,
				message: format!("No database configured for {}", entity.key()),
			});
		}

		Ok(serde_json::from_str(&response.text().await?)?)
	}

	async fn fetch_one(
		&self,
		entity: EntityType,
		id: &str,
	) -> Result<Option<RawPage>, SourceError> {
		let url = format!("{}/{}", self.pages_url(entity), id);
		let response = self.get(&url, None).await?;
		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}

		let page: RawPage = serde_json::from_str(&response.text().await?)?;
		if page.id.is_empty() {
			return Err(SourceError::InvalidResponse(format!(
				"Page {} returned without an id",
				id
			)));
		}
		Ok(Some(page))
	}

	fn name(&self) -> &'static str {
		"http"
	}
}
