//! # Project API Client
//!
//! HTTP client for the project-management API: import job status and project
//! lookup on the REST API, tag application on the v1 API.

use import_tagger_core::error::AppError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::info;

/// Longest response body excerpt kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Configuration for the project API client
#[derive(Clone)]
pub struct ApiConfig {
    /// API token, sent as `Authorization: token <token>`
    pub token: String,
    /// REST API base URL (job status, project lookup)
    pub rest_api_url: String,
    /// REST API version query parameter
    pub rest_api_version: String,
    /// v1 API base URL (tagging)
    pub v1_api_url: String,
    /// `origins` filter for project lookup
    pub project_origins: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("token", &"<redacted>")
            .field("rest_api_url", &self.rest_api_url)
            .field("rest_api_version", &self.rest_api_version)
            .field("v1_api_url", &self.v1_api_url)
            .field("project_origins", &self.project_origins)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for project API operations
pub struct ProjectApiClient {
    pub(crate) client: Client,
    pub(crate) rest_base: Url,
    pub(crate) v1_base: Url,
    pub(crate) rest_api_version: String,
    pub(crate) project_origins: String,
}

impl std::fmt::Debug for ProjectApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectApiClient")
            .field("rest_base", &self.rest_base.as_str())
            .field("v1_base", &self.v1_base.as_str())
            .field("rest_api_version", &self.rest_api_version)
            .finish()
    }
}

impl ProjectApiClient {
    /// Create new client with the given configuration
    pub fn new(config: ApiConfig) -> Result<Self, AppError> {
        let rest_base = parse_base_url(&config.rest_api_url)?;
        let v1_base = parse_base_url(&config.v1_api_url)?;

        let mut auth = HeaderValue::from_str(&format!("token {}", config.token))
            .map_err(|e| AppError::Config(format!("Invalid API token: {}", e)))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("import-tagger/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            rest_api_url = %rest_base,
            v1_api_url = %v1_base,
            timeout_ms = config.timeout.as_millis() as u64,
            "Created ProjectApiClient"
        );

        Ok(Self {
            client,
            rest_base,
            v1_base,
            rest_api_version: config.rest_api_version,
            project_origins: config.project_origins,
        })
    }

    /// Resolve a link that may be absolute or relative to the REST API host
    pub(crate) fn resolve_link(&self, link: &str) -> Result<Url, String> {
        match Url::parse(link) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .rest_base
                .join(link)
                .map_err(|e| format!("invalid link '{}': {}", link, e)),
            Err(e) => Err(format!("invalid link '{}': {}", link, e)),
        }
    }
}

/// Base URLs must end with '/' so `join` appends instead of replacing the last segment
fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|e| AppError::Config(format!("Invalid base URL '{}': {}", raw, e)))
}

/// Short description of an unexpected HTTP answer
pub(crate) fn describe_error_body(status: StatusCode, body: &str) -> String {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if excerpt.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, excerpt.trim())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> ApiConfig {
        ApiConfig {
            token: "secret-token".to_string(),
            rest_api_url: "https://api.example.com/rest".to_string(),
            rest_api_version: "2024-10-15".to_string(),
            v1_api_url: "https://api.example.com/v1/".to_string(),
            project_origins: "azure-repos".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_base_urls_are_normalized() {
        let client = ProjectApiClient::new(test_config()).unwrap();
        assert_eq!(client.rest_base.as_str(), "https://api.example.com/rest/");
        assert_eq!(client.v1_base.as_str(), "https://api.example.com/v1/");
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let mut config = test_config();
        config.rest_api_url = "not a url".to_string();
        assert!(matches!(ProjectApiClient::new(config), Err(AppError::Config(_))));
    }

    #[test]
    fn test_resolve_link() {
        let client = ProjectApiClient::new(test_config()).unwrap();
        assert_eq!(
            client.resolve_link("https://other.example.com/job/1").unwrap().as_str(),
            "https://other.example.com/job/1"
        );
        assert_eq!(
            client
                .resolve_link("/rest/orgs/org1/projects?starting_after=abc")
                .unwrap()
                .as_str(),
            "https://api.example.com/rest/orgs/org1/projects?starting_after=abc"
        );
    }

    #[test]
    fn test_describe_error_body_truncates() {
        let long = "x".repeat(2000);
        let described = describe_error_body(StatusCode::BAD_GATEWAY, &long);
        assert!(described.starts_with("502 Bad Gateway: "));
        assert!(described.len() < 600);
        assert_eq!(describe_error_body(StatusCode::NOT_FOUND, "  "), "404 Not Found");
    }
}
