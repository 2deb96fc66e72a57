mod connection;
pub mod repository;
mod schema;
mod vectors;

pub use connection::Database;
pub use vectors::{blob_to_f32s, f32s_to_blob, SearchResult, VectorRecord, VectorStore};
