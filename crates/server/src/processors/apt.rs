//! Debian packages: metadata comes from the `control` file.
//!
//! A `.deb` is an `ar` archive whose `control.tar.gz` member is a gzipped tar
//! holding `./control`.

use super::{StoredUpload, decode_stored};
use crate::error::ApiResult;
use crate::state::AppState;
use depot_core::{ControlFields, Error};
use depot_metadata::models::ArtifactRow;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path};

/// Archive member holding the control tarball.
pub const CONTROL_MEMBER: &str = "control.tar.gz";

/// Entry inside the control tarball holding the fields.
pub const CONTROL_FILE: &str = "./control";

/// Catalog a package with the fields of its control file. A version in the
/// control file wins over the one given with the upload.
pub async fn build(state: &AppState, upload: &StoredUpload) -> ApiResult<ArtifactRow> {
    let fields = decode_stored(state, &upload.storage_key, read_control).await?;

    let mut row = upload.base_row();
    row.architecture = fields.architecture;
    row.description = fields.description;
    if !fields.version.is_empty() {
        row.version = fields.version;
    }
    Ok(row)
}

fn malformed(e: std::io::Error) -> Error {
    Error::MalformedArchive(e.to_string())
}

/// Read the control fields out of a `.deb` stream.
pub fn read_control(reader: &mut dyn Read) -> depot_core::Result<ControlFields> {
    let mut archive = ar::Archive::new(reader);
    while let Some(entry) = archive.next_entry() {
        let entry = entry.map_err(malformed)?;
        let identifier = String::from_utf8_lossy(entry.header().identifier()).into_owned();
        // GNU ar terminates member names with a slash.
        if identifier.trim_end_matches('/') != CONTROL_MEMBER {
            continue;
        }

        let mut control = tar::Archive::new(GzDecoder::new(entry));
        for file in control.entries().map_err(malformed)? {
            let mut file = file.map_err(malformed)?;
            if !is_control_path(&file.path().map_err(malformed)?) {
                continue;
            }
            let mut text = String::new();
            file.read_to_string(&mut text).map_err(malformed)?;
            return Ok(ControlFields::parse(&text));
        }
        return Err(Error::ControlNotFound(CONTROL_FILE.to_string()));
    }
    Err(Error::ControlNotFound(CONTROL_MEMBER.to_string()))
}

/// `./control` and `control` name the same entry.
fn is_control_path(path: &Path) -> bool {
    let mut components = path.components().filter(|c| *c != Component::CurDir);
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == "control"
    )
}
