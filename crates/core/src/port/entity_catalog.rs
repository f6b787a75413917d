// Entity Catalog Port (Interface)
// Entity lookup and tag application on the project-management API

use crate::domain::{EntityRef, Tag};
use async_trait::async_trait;
use thiserror::Error;

/// How a tag call succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagApplied {
    Applied,
    /// Entity already carried the tag; counts as success
    AlreadyPresent,
}

/// Catalog errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

/// Entity catalog trait
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    /// Find entities in `org_id` matching `name` and `branch`
    async fn find_entities(
        &self,
        org_id: &str,
        name: &str,
        branch: &str,
    ) -> Result<Vec<EntityRef>, CatalogError>;

    /// Apply one tag to one entity
    async fn apply_tag(
        &self,
        org_id: &str,
        entity_id: &str,
        tag: &Tag,
    ) -> Result<TagApplied, CatalogError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    #[derive(Default)]
    struct State {
        entities: Vec<EntityRef>,
        find_error: Option<CatalogError>,
        failing_pairs: HashMap<(String, String), CatalogError>,
        applied: HashSet<(String, String, String)>,
        find_calls: usize,
        tag_calls: Vec<(String, Tag)>,
    }

    /// In-memory catalog that remembers applied tags
    ///
    /// Re-applying a tag answers `AlreadyPresent`, like the real API.
    #[derive(Default)]
    pub struct MockEntityCatalog {
        state: Mutex<State>,
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl MockEntityCatalog {
        pub fn new(entities: Vec<EntityRef>) -> Self {
            let catalog = Self::default();
            lock(&catalog.state).entities = entities;
            catalog
        }

        pub fn empty() -> Self {
            Self::default()
        }

        /// Make every lookup fail with `error`
        pub fn fail_lookup(&self, error: CatalogError) {
            lock(&self.state).find_error = Some(error);
        }

        pub fn clear_lookup_failure(&self) {
            lock(&self.state).find_error = None;
        }

        /// Make tagging `entity_id` with `key` fail with `error`
        pub fn fail_tag(&self, entity_id: &str, key: &str, error: CatalogError) {
            lock(&self.state)
                .failing_pairs
                .insert((entity_id.to_string(), key.to_string()), error);
        }

        pub fn clear_tag_failures(&self) {
            lock(&self.state).failing_pairs.clear();
        }

        pub fn find_calls(&self) -> usize {
            lock(&self.state).find_calls
        }

        pub fn tag_calls(&self) -> Vec<(String, Tag)> {
            lock(&self.state).tag_calls.clone()
        }

        pub fn has_tag(&self, entity_id: &str, tag: &Tag) -> bool {
            lock(&self.state).applied.contains(&(
                entity_id.to_string(),
                tag.key.clone(),
                tag.value.clone(),
            ))
        }
    }

    #[async_trait]
    impl EntityCatalog for MockEntityCatalog {
        async fn find_entities(
            &self,
            _org_id: &str,
            name: &str,
            branch: &str,
        ) -> Result<Vec<EntityRef>, CatalogError> {
            let mut state = lock(&self.state);
            state.find_calls += 1;
            if let Some(err) = state.find_error.clone() {
                return Err(err);
            }
            Ok(state
                .entities
                .iter()
                .filter(|e| e.name.starts_with(name) && e.branch == branch)
                .cloned()
                .collect())
        }

        async fn apply_tag(
            &self,
            _org_id: &str,
            entity_id: &str,
            tag: &Tag,
        ) -> Result<TagApplied, CatalogError> {
            let mut state = lock(&self.state);
            state.tag_calls.push((entity_id.to_string(), tag.clone()));

            if let Some(err) = state
                .failing_pairs
                .get(&(entity_id.to_string(), tag.key.clone()))
            {
                return Err(err.clone());
            }

            let inserted = state.applied.insert((
                entity_id.to_string(),
                tag.key.clone(),
                tag.value.clone(),
            ));
            Ok(if inserted {
                TagApplied::Applied
            } else {
                TagApplied::AlreadyPresent
            })
        }
    }
}
