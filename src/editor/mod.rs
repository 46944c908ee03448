//! Editing existing documents.
//!
//! ## Architecture
//!
//! ```text
//! original bytes
//!     ↓
//! [patch] (pure byte-level edits, xref rebuilt after each)
//!     or
//! [incremental] (original bytes + appended objects, xref and trailer)
//!     ↓
//! new bytes
//! ```
//!
//! [`patch`] works without any object model: it locates `N G obj` markers
//! and dictionary keys by scanning. [`incremental`] serializes objects from
//! an [`ObjectStore`](crate::store::ObjectStore) after the original bytes.

pub mod incremental;
pub mod patch;

pub use incremental::{incremental_update, save_incremental, IncrementalRequest};
pub use patch::ObjectContent;
