//! Deployment manifests: parsing, loading and image diffs.

pub mod diff;
pub mod error;
pub mod loader;
pub mod object;

pub use diff::{diff, image_set, ImageDiff, ImageSet, ManifestDiff};
pub use error::ManifestError;
pub use loader::{load_file, load_tree};
pub use object::{parse, parse_object, Image, ManifestObject, ObjectId, DEFAULT_NAMESPACE};
