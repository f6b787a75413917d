// Import Tag Request Domain Model

use serde::{Deserialize, Serialize};

/// A single key/value label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Decoded queue message body
///
/// Immutable once decoded. Serializes back to the queue wire format, where the
/// job reference travels under the `import_job_url` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTagRequest {
    pub target_name: String,
    pub branch: String,
    pub tags: Vec<Tag>,
    pub org_id: String,
    #[serde(rename = "import_job_url")]
    pub import_job_reference: String,
}

impl ImportTagRequest {
    /// Encode to the queue wire format
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_uses_import_job_url_key() {
        let req = ImportTagRequest {
            target_name: "svc-a".to_string(),
            branch: "main".to_string(),
            tags: vec![Tag::new("team", "payments")],
            org_id: "org1".to_string(),
            import_job_reference: "https://api.example.com/imports/job1".to_string(),
        };

        let wire = req.to_wire().unwrap();
        assert_eq!(
            wire,
            r#"{"target_name":"svc-a","branch":"main","tags":[{"key":"team","value":"payments"}],"org_id":"org1","import_job_url":"https://api.example.com/imports/job1"}"#
        );
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag::new("team", "payments").to_string(), "team=payments");
    }
}
