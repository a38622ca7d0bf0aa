//! Container templates: metadata comes from the bundle's `config` file.

use super::{StoredUpload, decode_stored};
use crate::error::ApiResult;
use crate::state::AppState;
use depot_core::{Error, ParentRef, TEMPLATE_CONFIG_MEMBER, TemplateConfig};
use depot_metadata::models::ArtifactRow;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path};

/// Validate a template bundle and build its record.
///
/// Checks run in a fixed order and the first failure wins: required fields,
/// owner, parent dependency, then name/version format. The returned parent is
/// checked again when the record is inserted.
pub async fn build(
    state: &AppState,
    upload: &StoredUpload,
) -> ApiResult<(ArtifactRow, Option<ParentRef>)> {
    let config = decode_stored(state, &upload.storage_key, read_config).await?;

    config.check_required_fields()?;
    config.check_owner(&upload.owner)?;
    let parent = config.required_parent();
    if let Some(parent) = &parent
        && !state.metadata.parent_exists(parent).await?
    {
        return Err(Error::DependencyMissing {
            name: parent.name.clone(),
            owner: parent.owner.clone(),
            version: parent.version.clone(),
        }
        .into());
    }
    config.check_format()?;

    let mut row = upload.base_row();
    row.name = config.name;
    row.version = config.version;
    row.architecture = config.architecture;
    row.description = config.description;
    row.parent = config.parent;
    row.parent_owner = config.parent_owner;
    row.parent_version = config.parent_version;
    row.pref_size = config.pref_size;
    if !config.tags.is_empty() {
        row.tags = config.tags;
    }
    Ok((row, parent))
}

/// Read the template config out of a gzipped tar stream.
pub fn read_config(reader: &mut dyn Read) -> depot_core::Result<TemplateConfig> {
    let malformed = |e: std::io::Error| Error::MalformedArchive(e.to_string());

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        if !is_config_path(&entry.path().map_err(malformed)?) {
            continue;
        }
        let mut text = String::new();
        entry.read_to_string(&mut text).map_err(malformed)?;
        return Ok(TemplateConfig::parse(&text));
    }
    Err(Error::ControlNotFound(TEMPLATE_CONFIG_MEMBER.to_string()))
}

fn is_config_path(path: &Path) -> bool {
    let mut components = path.components().filter(|c| *c != Component::CurDir);
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == TEMPLATE_CONFIG_MEMBER
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn bundle(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, data.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn reads_top_level_config() {
        let data = bundle(&[
            ("rootfs/etc/config", "lxc.utsname = wrong\n"),
            (
                "./config",
                "lxc.utsname = Base\nsubutai.parent = base\nsubutai.template.version = 1.0\n",
            ),
        ]);
        let config = read_config(&mut data.as_slice()).unwrap();
        assert_eq!(config.name, "base");
        assert_eq!(config.version, "1.0");
        assert!(config.is_root());
    }

    #[test]
    fn missing_config_is_control_not_found() {
        let data = bundle(&[("rootfs/readme", "hi")]);
        let err = read_config(&mut data.as_slice()).unwrap_err();
        assert!(matches!(err, Error::ControlNotFound(m) if m == TEMPLATE_CONFIG_MEMBER));
    }

    #[test]
    fn plain_bytes_are_malformed() {
        let err = read_config(&mut b"not a bundle".as_slice()).unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)));
    }
}
