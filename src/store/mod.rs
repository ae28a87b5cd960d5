//! Typed views over the backend: per-record field sets and the per-user
//! recency index, plus the text encoding used for payload fields.

pub mod codec;
pub mod recency_index;
pub mod record_store;

pub use recency_index::RecencyIndex;
pub use record_store::{Record, RecordStore};
