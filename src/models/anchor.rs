use serde::{Deserialize, Serialize};

/// Locator pinning a chunk or atom to coordinates inside its source file.
///
/// Serialized anchors feed into deterministic chunk IDs, so optional fields
/// are omitted entirely rather than emitted as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EvidenceAnchor {
    pub asset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_end: Option<i64>,
}

impl EvidenceAnchor {
    pub fn for_asset(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_json_omits_empty_fields() {
        let anchor = EvidenceAnchor::for_asset("abc");
        assert_eq!(anchor.to_json(), r#"{"asset_id":"abc"}"#);
    }

    #[test]
    fn test_anchor_round_trip() {
        let anchor = EvidenceAnchor {
            asset_id: "abc".to_string(),
            chapter: Some("ch3".to_string()),
            archive_chain: Some("inner/file.txt".to_string()),
            line_start: Some(10),
            line_end: Some(20),
            ..Default::default()
        };
        let parsed = EvidenceAnchor::parse(&anchor.to_json()).unwrap();
        assert_eq!(parsed, anchor);
    }

    #[test]
    fn test_anchor_parse_rejects_garbage() {
        assert!(EvidenceAnchor::parse("not json").is_none());
    }
}
