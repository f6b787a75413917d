//! Import job status lookups (`ImportStatusSource`)

use crate::client::{describe_error_body, ProjectApiClient};
use async_trait::async_trait;
use import_tagger_core::domain::ImportStatus;
use import_tagger_core::port::{ImportStatusSource, StatusQueryError};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ImportJobBody {
    status: Option<String>,
}

/// Map an import job body to a status
pub(crate) fn parse_status(body: &str) -> Result<ImportStatus, StatusQueryError> {
    let job: ImportJobBody = serde_json::from_str(body)
        .map_err(|e| StatusQueryError::InvalidResponse(format!("import job body: {}", e)))?;

    let status = job
        .status
        .ok_or_else(|| StatusQueryError::InvalidResponse("import job body has no status".to_string()))?;

    Ok(match status.as_str() {
        "pending" => ImportStatus::Pending,
        "complete" => ImportStatus::Complete,
        "failed" => ImportStatus::Failed("import job reported status 'failed'".to_string()),
        other => ImportStatus::Unknown(format!("unrecognized import status '{}'", other)),
    })
}

/// Map a status lookup response; only success bodies are parsed
pub(crate) fn classify_status_response(status: StatusCode, body: &str) -> Result<ImportStatus, StatusQueryError> {
    if !status.is_success() {
        return Err(StatusQueryError::Api {
            status: status.as_u16(),
            message: describe_error_body(status, body),
        });
    }
    parse_status(body)
}

fn map_transport_error(e: reqwest::Error) -> StatusQueryError {
    if e.is_timeout() {
        StatusQueryError::Timeout
    } else {
        StatusQueryError::Transport(e.to_string())
    }
}

#[async_trait]
impl ImportStatusSource for ProjectApiClient {
    async fn get_status(&self, job_reference: &str) -> Result<ImportStatus, StatusQueryError> {
        let url = self
            .resolve_link(job_reference)
            .map_err(StatusQueryError::InvalidResponse)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        let parsed = classify_status_response(status, &body)?;
        debug!(job_reference, status = %parsed, "Queried import job status");
        Ok(parsed)
    }
}
