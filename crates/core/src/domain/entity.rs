// Entity & Tagging Results

use super::request::Tag;

/// Remote entity created by an import, correlated by name and branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
    pub branch: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            branch: branch.into(),
        }
    }
}

/// Per-entity result of applying a tag batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOutcome {
    pub entity_id: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// One (entity, tag) pair that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFailure {
    pub entity_id: String,
    pub tag: Tag,
    pub cause: String,
}

impl std::fmt::Display for TagFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.entity_id, self.tag, self.cause)
    }
}

/// Aggregate result of a tag batch across all entities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub outcomes: Vec<TagOutcome>,
    pub failures: Vec<TagFailure>,
}

impl TagReport {
    /// True only if every (entity, tag) pair succeeded
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.attempted == self.succeeded
    }

    /// Some pairs succeeded and some did not
    pub fn is_partial_failure(&self) -> bool {
        !self.failures.is_empty() && self.succeeded > 0
    }
}
