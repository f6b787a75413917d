// Entity Resolver
// Finds the entities a completed import produced

use crate::domain::EntityRef;
use crate::port::{CatalogError, EntityCatalog};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::warn;

pub struct EntityResolver {
    catalog: Arc<dyn EntityCatalog>,
}

impl EntityResolver {
    pub fn new(catalog: Arc<dyn EntityCatalog>) -> Self {
        Self { catalog }
    }

    /// Entities in `org_id` whose name starts with `name` and whose branch equals `branch`
    ///
    /// Entities the catalog returns without a branch are kept, since the catalog
    /// already filtered on it. An empty result is not an error. Lookup failures
    /// and running past the deadline are.
    pub async fn resolve(
        &self,
        org_id: &str,
        name: &str,
        branch: &str,
        deadline: Instant,
    ) -> Result<Vec<EntityRef>, CatalogError> {
        let found = timeout_at(deadline, self.catalog.find_entities(org_id, name, branch))
            .await
            .map_err(|_| CatalogError::DeadlineExceeded)??;

        let total = found.len();
        let matched: Vec<EntityRef> = found
            .into_iter()
            .filter(|e| (e.branch.is_empty() || e.branch == branch) && e.name.starts_with(name))
            .collect();

        if matched.len() != total {
            warn!(
                org_id = %org_id,
                target_name = %name,
                branch = %branch,
                discarded = total - matched.len(),
                "Discarded entities not matching name/branch"
            );
        }

        Ok(matched)
    }
}
