mod anchor;
mod annotation;
mod asset;
mod atom;
mod chunk;
mod concept;
mod graph;
mod job;
mod volume;

pub use anchor::EvidenceAnchor;
pub use annotation::Annotation;
pub use asset::FileAsset;
pub use atom::ContentAtom;
pub use chunk::Chunk;
pub use concept::ConceptNode;
pub use graph::{edge_type, GraphEdge};
pub use job::PipelineJob;
pub use volume::WatchedVolume;

use serde::{Deserialize, Serialize};

/// Processing state of a file asset. Advances monotonically through the
/// pipeline; `Error` is terminal until the file changes on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    #[default]
    Pending,
    Extracted,
    Chunked,
    Embedded,
    Annotated,
    Error,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Pending => "pending",
            AssetStatus::Extracted => "extracted",
            AssetStatus::Chunked => "chunked",
            AssetStatus::Embedded => "embedded",
            AssetStatus::Annotated => "annotated",
            AssetStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for AssetStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssetStatus::Pending),
            "extracted" => Ok(AssetStatus::Extracted),
            "chunked" => Ok(AssetStatus::Chunked),
            "embedded" => Ok(AssetStatus::Embedded),
            "annotated" => Ok(AssetStatus::Annotated),
            "error" => Ok(AssetStatus::Error),
            other => Err(format!("unknown asset status: {other}")),
        }
    }
}

/// Kind of content fragment an extractor produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AtomType {
    #[default]
    Text,
    Image,
    Table,
    Metadata,
    Binary,
}

impl AtomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomType::Text => "text",
            AtomType::Image => "image",
            AtomType::Table => "table",
            AtomType::Metadata => "metadata",
            AtomType::Binary => "binary",
        }
    }
}

impl std::str::FromStr for AtomType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(AtomType::Text),
            "image" => Ok(AtomType::Image),
            "table" => Ok(AtomType::Table),
            "metadata" => Ok(AtomType::Metadata),
            "binary" => Ok(AtomType::Binary),
            other => Err(format!("unknown atom type: {other}")),
        }
    }
}

/// State of a pipeline run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_status_round_trip() {
        for status in [
            AssetStatus::Pending,
            AssetStatus::Extracted,
            AssetStatus::Chunked,
            AssetStatus::Embedded,
            AssetStatus::Annotated,
            AssetStatus::Error,
        ] {
            let parsed: AssetStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_serde_uses_lowercase_strings() {
        assert_eq!(
            serde_json::to_string(&AssetStatus::Annotated).unwrap(),
            "\"annotated\""
        );
        assert_eq!(
            serde_json::to_string(&AtomType::Metadata).unwrap(),
            "\"metadata\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!("bogus".parse::<AssetStatus>().is_err());
        assert!("bogus".parse::<AtomType>().is_err());
        assert!("bogus".parse::<JobStatus>().is_err());
    }
}
