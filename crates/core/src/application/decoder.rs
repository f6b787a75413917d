// Message Decoder
// Raw queue payload -> ImportTagRequest

use crate::domain::{DomainError, ImportTagRequest, Tag};
use serde::Deserialize;

/// Wire shape with every field optional so missing keys are reported by name
#[derive(Debug, Deserialize)]
struct WireRequest {
    target_name: Option<String>,
    branch: Option<String>,
    tags: Option<Vec<WireTag>>,
    org_id: Option<String>,
    import_job_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTag {
    key: Option<String>,
    value: Option<String>,
}

/// Decode a raw queue payload
///
/// # Errors
/// - DomainError::Malformed if the payload is not a JSON object of the expected
///   shape, a required field is missing or empty, or a tag lacks `key`/`value`
pub fn decode(raw: &[u8]) -> Result<ImportTagRequest, DomainError> {
    let wire: WireRequest = serde_json::from_slice(raw)
        .map_err(|e| DomainError::Malformed(format!("invalid JSON payload: {}", e)))?;

    let target_name = required(wire.target_name, "target_name")?;
    let branch = required(wire.branch, "branch")?;
    let org_id = required(wire.org_id, "org_id")?;
    let import_job_reference = required(wire.import_job_url, "import_job_url")?;

    let wire_tags = wire
        .tags
        .ok_or_else(|| DomainError::Malformed("missing field 'tags'".to_string()))?;

    let tags = wire_tags
        .into_iter()
        .enumerate()
        .map(|(idx, tag)| {
            let key = tag
                .key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| DomainError::Malformed(format!("tags[{}] has no 'key'", idx)))?;
            let value = tag
                .value
                .ok_or_else(|| DomainError::Malformed(format!("tags[{}] has no 'value'", idx)))?;
            Ok(Tag { key, value })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    Ok(ImportTagRequest {
        target_name,
        branch,
        tags,
        org_id,
        import_job_reference,
    })
}

fn required(field: Option<String>, name: &str) -> Result<String, DomainError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(DomainError::Malformed(format!("field '{}' is empty", name))),
        None => Err(DomainError::Malformed(format!("missing field '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> serde_json::Value {
        json!({
            "target_name": "svc-a",
            "branch": "main",
            "tags": [{"key": "team", "value": "payments"}],
            "org_id": "org1",
            "import_job_url": "https://api.example.com/imports/job1"
        })
    }

    fn decode_value(value: &serde_json::Value) -> Result<ImportTagRequest, DomainError> {
        decode(value.to_string().as_bytes())
    }

    #[test]
    fn test_decode_valid_payload() {
        let req = decode_value(&valid()).unwrap();
        assert_eq!(req.target_name, "svc-a");
        assert_eq!(req.branch, "main");
        assert_eq!(req.org_id, "org1");
        assert_eq!(req.import_job_reference, "https://api.example.com/imports/job1");
        assert_eq!(req.tags, vec![Tag::new("team", "payments")]);
    }

    #[test]
    fn test_decode_ignores_unknown_keys() {
        let mut payload = valid();
        payload["attempts"] = json!(3);
        payload["extra"] = json!({"nested": true});
        assert!(decode_value(&payload).is_ok());
    }

    #[test]
    fn test_decode_accepts_empty_tag_list() {
        let mut payload = valid();
        payload["tags"] = json!([]);
        assert!(decode_value(&payload).unwrap().tags.is_empty());
    }

    #[test]
    fn test_decode_missing_required_fields() {
        for field in ["target_name", "branch", "tags", "org_id", "import_job_url"] {
            let mut payload = valid();
            payload.as_object_mut().unwrap().remove(field);

            let err = decode_value(&payload).unwrap_err();
            assert!(
                err.to_string().contains(field),
                "error for missing {} was: {}",
                field,
                err
            );
        }
    }

    #[test]
    fn test_decode_empty_scalar_fields() {
        for field in ["target_name", "branch", "org_id", "import_job_url"] {
            let mut payload = valid();
            payload[field] = json!("  ");
            assert!(matches!(
                decode_value(&payload),
                Err(DomainError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_decode_tag_missing_key_or_value() {
        let mut payload = valid();
        payload["tags"] = json!([{"key": "team", "value": "a"}, {"value": "b"}]);
        assert!(decode_value(&payload)
            .unwrap_err()
            .to_string()
            .contains("tags[1]"));

        let mut payload = valid();
        payload["tags"] = json!([{"key": "team"}]);
        assert!(decode_value(&payload)
            .unwrap_err()
            .to_string()
            .contains("'value'"));
    }

    #[test]
    fn test_decode_wrong_types() {
        let mut payload = valid();
        payload["org_id"] = json!(42);
        assert!(decode_value(&payload).is_err());

        let mut payload = valid();
        payload["tags"] = json!({"key": "team", "value": "x"});
        assert!(decode_value(&payload).is_err());
    }

    #[test]
    fn test_decode_not_json() {
        assert!(matches!(
            decode(b"not json at all"),
            Err(DomainError::Malformed(_))
        ));
        assert!(decode(b"[1,2,3]").is_err());
        assert!(decode(b"").is_err());
    }
}
