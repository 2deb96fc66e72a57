mod annotations;
mod assets;
mod atoms;
mod chunks;
mod concepts;
mod edges;
mod jobs;
mod volumes;

pub use annotations::AnnotationRepository;
pub use assets::AssetRepository;
pub use atoms::AtomRepository;
pub use chunks::ChunkRepository;
pub use concepts::ConceptRepository;
pub use edges::{EdgeOrder, EdgeRepository};
pub use jobs::JobRepository;
pub use volumes::VolumeRepository;

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 timestamp column, tolerating legacy or empty values.
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

pub(crate) fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_ts)
}
