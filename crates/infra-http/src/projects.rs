//! Project lookup and tagging (`EntityCatalog`)

use crate::client::{describe_error_body, ProjectApiClient};
use async_trait::async_trait;
use import_tagger_core::domain::{EntityRef, Tag};
use import_tagger_core::port::{CatalogError, EntityCatalog, TagApplied};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Projects requested per page
const PAGE_LIMIT: &str = "100";

/// Upper bound on followed `links.next` pages
const MAX_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
struct ProjectsPage {
    #[serde(default)]
    data: Vec<ProjectItem>,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct ProjectItem {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: ProjectAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectAttributes {
    #[serde(default)]
    name: String,
    #[serde(default)]
    target_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<String>,
}

#[derive(Serialize)]
struct TagBody<'a> {
    key: &'a str,
    value: &'a str,
}

/// Parsed page: project entities plus the next-page link, if any
pub(crate) fn parse_projects_page(body: &str) -> Result<(Vec<EntityRef>, Option<String>), CatalogError> {
    let page: ProjectsPage = serde_json::from_str(body)
        .map_err(|e| CatalogError::InvalidResponse(format!("projects page: {}", e)))?;

    let entities = page
        .data
        .into_iter()
        .filter(|item| item.kind == "project")
        .map(|item| {
            EntityRef::new(
                item.id,
                item.attributes.name,
                item.attributes.target_reference.unwrap_or_default(),
            )
        })
        .collect();

    let next = page
        .links
        .and_then(|links| links.next)
        .filter(|next| !next.is_empty());

    Ok((entities, next))
}

/// Map a tagging response to its outcome; 422 means the tag is already on the project
pub(crate) fn classify_tag_response(status: StatusCode, body: &str) -> Result<TagApplied, CatalogError> {
    if status.is_success() {
        return Ok(TagApplied::Applied);
    }
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        return Ok(TagApplied::AlreadyPresent);
    }
    Err(CatalogError::Api {
        status: status.as_u16(),
        message: describe_error_body(status, body),
    })
}

/// Non-success listing responses become `Api` errors
pub(crate) fn check_page_response(status: StatusCode, body: String) -> Result<String, CatalogError> {
    if !status.is_success() {
        return Err(CatalogError::Api {
            status: status.as_u16(),
            message: describe_error_body(status, &body),
        });
    }
    Ok(body)
}

fn map_transport_error(e: reqwest::Error) -> CatalogError {
    if e.is_timeout() {
        CatalogError::DeadlineExceeded
    } else {
        CatalogError::Transport(e.to_string())
    }
}

impl ProjectApiClient {
    /// `{rest}orgs/{org}/projects` with lookup filters
    pub(crate) fn projects_url(&self, org_id: &str, target_name: &str, branch: &str) -> Result<Url, CatalogError> {
        let mut url = self.rest_base.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidResponse("REST base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["orgs", org_id, "projects"]);
        url.query_pairs_mut()
            .append_pair("version", &self.rest_api_version)
            .append_pair("names_start_with", target_name)
            .append_pair("target_reference", branch)
            .append_pair("origins", &self.project_origins)
            .append_pair("limit", PAGE_LIMIT);
        Ok(url)
    }

    /// `{v1}org/{org}/project/{id}/tags`
    pub(crate) fn tags_url(&self, org_id: &str, entity_id: &str) -> Result<Url, CatalogError> {
        let mut url = self.v1_base.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidResponse("v1 base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["org", org_id, "project", entity_id, "tags"]);
        Ok(url)
    }

    async fn fetch_page(&self, url: Url) -> Result<String, CatalogError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;
        check_page_response(status, body)
    }

    /// Resolve a `links.next` value, refusing links that lead back to the current page
    pub(crate) fn next_page_url(&self, current: &Url, next: &str) -> Result<Url, CatalogError> {
        let next_url = self.resolve_link(next).map_err(CatalogError::InvalidResponse)?;
        if &next_url == current {
            return Err(CatalogError::InvalidResponse(format!(
                "pagination link points back at current page: {}",
                next
            )));
        }
        Ok(next_url)
    }
}

#[async_trait]
impl EntityCatalog for ProjectApiClient {
    async fn find_entities(
        &self,
        org_id: &str,
        target_name: &str,
        branch: &str,
    ) -> Result<Vec<EntityRef>, CatalogError> {
        let mut url = self.projects_url(org_id, target_name, branch)?;
        let mut entities = Vec::new();

        for _ in 0..MAX_PAGES {
            let body = self.fetch_page(url.clone()).await?;
            let (page, next) = parse_projects_page(&body)?;
            entities.extend(page);

            let Some(next) = next else {
                debug!(org_id, target_name, branch, count = entities.len(), "Listed projects");
                return Ok(entities);
            };

            url = self.next_page_url(&url, &next)?;
        }

        Err(CatalogError::InvalidResponse(format!(
            "project listing exceeded {} pages",
            MAX_PAGES
        )))
    }

    async fn apply_tag(&self, org_id: &str, entity_id: &str, tag: &Tag) -> Result<TagApplied, CatalogError> {
        let url = self.tags_url(org_id, entity_id)?;
        let response = self
            .client
            .post(url)
            .json(&TagBody {
                key: &tag.key,
                value: &tag.value,
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_tag_response(status, &body)
    }
}
