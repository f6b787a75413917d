// Tag Applicator
// Applies every tag to every entity without short-circuiting

use crate::domain::{EntityRef, Tag, TagFailure, TagOutcome, TagReport};
use crate::port::{CatalogError, EntityCatalog, TagApplied};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info};

pub struct TagApplicator {
    catalog: Arc<dyn EntityCatalog>,
}

impl TagApplicator {
    pub fn new(catalog: Arc<dyn EntityCatalog>) -> Self {
        Self { catalog }
    }

    /// Apply `tags` to each of `entities`
    ///
    /// Each (entity, tag) pair is attempted independently, so one failure never
    /// blocks the remaining pairs. Calls that would run past `deadline` fail.
    pub async fn apply(
        &self,
        org_id: &str,
        entities: &[EntityRef],
        tags: &[Tag],
        deadline: Instant,
    ) -> TagReport {
        let mut report = TagReport::default();

        for entity in entities {
            let mut first_error: Option<String> = None;

            for tag in tags {
                report.attempted += 1;
                let result = timeout_at(deadline, self.catalog.apply_tag(org_id, &entity.id, tag))
                    .await
                    .unwrap_or(Err(CatalogError::DeadlineExceeded));

                match result {
                    Ok(TagApplied::Applied) => {
                        report.succeeded += 1;
                        info!(entity_id = %entity.id, tag = %tag, "Tagged entity");
                    }
                    Ok(TagApplied::AlreadyPresent) => {
                        report.succeeded += 1;
                        info!(entity_id = %entity.id, tag = %tag, "Entity already tagged");
                    }
                    Err(e) => {
                        error!(entity_id = %entity.id, tag = %tag, error = %e, "Failed to tag entity");
                        let cause = e.to_string();
                        first_error.get_or_insert_with(|| cause.clone());
                        report.failures.push(TagFailure {
                            entity_id: entity.id.clone(),
                            tag: tag.clone(),
                            cause,
                        });
                    }
                }
            }

            report.outcomes.push(TagOutcome {
                entity_id: entity.id.clone(),
                succeeded: first_error.is_none(),
                error: first_error,
            });
        }

        report
    }
}
