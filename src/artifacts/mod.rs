//! Model artifact synchronization from object storage.
//!
//! Weights live in an S3-compatible bucket and are mirrored onto the local
//! (usually persistent) volume before the model is launched. Files already on
//! disk are trusted by presence alone when `skip_existing` is set; downloads
//! never leave a partially written file at the final path.

mod partial;
mod store;
mod sync;
mod types;

pub use store::{ArtifactStore, ObjectStoreArtifacts};
pub use sync::sync;
pub use types::{SyncReport, TransferStatus};
