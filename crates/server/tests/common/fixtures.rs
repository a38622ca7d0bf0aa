//! Test fixtures: Debian packages and template bundles built in memory.

use flate2::Compression;
use flate2::write::GzEncoder;

/// Gzipped tar holding `entries`.
#[allow(dead_code)]
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A `.deb` whose control file has the given text.
#[allow(dead_code)]
pub fn deb_package(control: &str) -> Vec<u8> {
    let members: [(&str, Vec<u8>); 3] = [
        ("debian-binary", b"2.0\n".to_vec()),
        (
            "control.tar.gz",
            tar_gz(&[("./control", control.as_bytes())]),
        ),
        ("data.tar.gz", tar_gz(&[("./usr/share/doc/readme", b"hi".as_slice())])),
    ];
    let mut builder = ar::Builder::new(Vec::new());
    for (name, data) in &members {
        let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
        builder.append(&header, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Fields of a template `config` file.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct TemplateSpec<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub owner: &'a str,
    pub parent: &'a str,
    pub parent_owner: &'a str,
    pub parent_version: &'a str,
}

#[allow(dead_code)]
impl<'a> TemplateSpec<'a> {
    /// A root template: its own parent.
    pub fn root(name: &'a str, version: &'a str, owner: &'a str) -> Self {
        Self {
            name,
            version,
            owner,
            parent: name,
            parent_owner: owner,
            parent_version: version,
        }
    }

    /// A template built on `parent@parent_owner:parent_version`.
    pub fn child(
        name: &'a str,
        version: &'a str,
        owner: &'a str,
        parent: (&'a str, &'a str, &'a str),
    ) -> Self {
        Self {
            name,
            version,
            owner,
            parent: parent.0,
            parent_owner: parent.1,
            parent_version: parent.2,
        }
    }

    /// The `config` file text.
    pub fn config(&self) -> String {
        format!(
            "lxc.arch = amd64\n\
             lxc.utsname = {}\n\
             lxc.rootfs = /var/lib/lxc/{}/rootfs\n\
             subutai.parent = {}\n\
             subutai.parent.owner = {}\n\
             subutai.parent.version = {}\n\
             subutai.template.version = {}\n\
             subutai.template.owner = {}\n\
             subutai.template.size = 2048\n\
             subutai.template.description = test template\n",
            self.name,
            self.name,
            self.parent,
            self.parent_owner,
            self.parent_version,
            self.version,
            self.owner,
        )
    }

    /// A bundle holding the config and a token rootfs file.
    pub fn bundle(&self) -> Vec<u8> {
        bundle_with_config(&self.config())
    }
}

/// A template bundle with an arbitrary config text.
#[allow(dead_code)]
pub fn bundle_with_config(config: &str) -> Vec<u8> {
    tar_gz(&[
        ("config", config.as_bytes()),
        ("rootfs/etc/hostname", b"template\n".as_slice()),
    ])
}
