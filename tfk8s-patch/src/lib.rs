//! JSON Patch (RFC 6902) documents for Kubernetes update requests.
//!
//! Updates are sent to the API server as a list of `add`, `replace` and
//! `remove` operations rather than as a full object, so that fields owned by
//! other controllers or users are left alone. The building blocks are:
//!
//! - [`PatchOperation`] and [`PatchOperations`]: the document model and its
//!   wire format.
//! - [`escape_json_pointer`]: RFC 6901 escaping for map keys used as path
//!   segments.
//! - [`diff_map`]: the minimal operations turning one flat map into another,
//!   used for labels, annotations and data maps.

mod diff;
mod operation;
mod pointer;

pub use diff::diff_map;
pub use operation::{PatchOperation, PatchOperations};
pub use pointer::{child_path, escape_json_pointer};

/// The content type of a JSON Patch request body.
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";
