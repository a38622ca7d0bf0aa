//! Raw files: cataloged as uploaded.

use super::StoredUpload;
use depot_metadata::models::ArtifactRow;

/// Raw artifacts carry only the generic fields.
pub fn build(upload: &StoredUpload) -> ArtifactRow {
    upload.base_row()
}
