//! Template bundle configuration and validation rules.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Allowed characters for template names and versions.
static NAME_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._-]+$").expect("template name pattern is valid")
});

/// Name of the config member inside a template bundle.
pub const TEMPLATE_CONFIG_MEMBER: &str = "config";

/// Fields read from a template's `config` file.
///
/// Keys and values are lowercased and trimmed when parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateConfig {
    pub name: String,
    pub architecture: String,
    pub parent: String,
    pub parent_owner: String,
    pub parent_version: String,
    pub version: String,
    pub pref_size: String,
    pub owner: String,
    pub description: String,
    pub tags: String,
}

/// The parent a template declares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    pub name: String,
    pub owner: String,
    pub version: String,
}

impl TemplateConfig {
    /// Parse `key = value` lines. Unrecognized keys are ignored.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim().to_lowercase();
            let slot = match key.as_str() {
                "lxc.arch" => &mut config.architecture,
                "lxc.utsname" => &mut config.name,
                "subutai.parent" => &mut config.parent,
                "subutai.parent.owner" => &mut config.parent_owner,
                "subutai.parent.version" => &mut config.parent_version,
                "subutai.template.version" => &mut config.version,
                "subutai.template.size" => &mut config.pref_size,
                "subutai.template.owner" => &mut config.owner,
                "subutai.template.description" => &mut config.description,
                "subutai.tags" => &mut config.tags,
                _ => continue,
            };
            *slot = value;
        }
        config
    }

    /// Every required field must be non-empty.
    pub fn check_required_fields(&self) -> Result<()> {
        let required = [
            ("parent", &self.parent),
            ("parent-owner", &self.parent_owner),
            ("parent-version", &self.parent_version),
            ("version", &self.version),
            ("name", &self.name),
            ("owner", &self.owner),
        ];
        match required.iter().find(|(_, value)| value.is_empty()) {
            Some((field, _)) => Err(Error::MissingField(*field)),
            None => Ok(()),
        }
    }

    /// The declared owner must be the uploader. Config values are lowercased,
    /// so the uploader is compared case-insensitively.
    pub fn check_owner(&self, uploader: &str) -> Result<()> {
        if self.owner == uploader.to_lowercase() {
            Ok(())
        } else {
            Err(Error::OwnerMismatch {
                declared: self.owner.clone(),
                uploader: uploader.to_string(),
            })
        }
    }

    /// Name and version must use the restricted character set.
    pub fn check_format(&self) -> Result<()> {
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if !NAME_FORMAT.is_match(value) {
                return Err(Error::InvalidFormat {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// A root template names itself as its parent.
    pub fn is_root(&self) -> bool {
        self.name == self.parent
    }

    /// The parent this template requires, or `None` for a root template.
    pub fn required_parent(&self) -> Option<ParentRef> {
        (!self.is_root()).then(|| ParentRef {
            name: self.parent.clone(),
            owner: self.parent_owner.clone(),
            version: self.parent_version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "\
lxc.arch = AMD64
lxc.utsname = Child
subutai.parent = base
subutai.parent.owner = alice
subutai.parent.version = 1.0
subutai.template.version = 2.0
subutai.template.owner = alice
subutai.template.size = 1024
subutai.template.description = A child template
lxc.rootfs = /var/lib/lxc/child/rootfs
# comment line
";

    #[test]
    fn test_parse_lowercases_and_trims() {
        let config = TemplateConfig::parse(CONFIG);
        assert_eq!(config.architecture, "amd64");
        assert_eq!(config.name, "child");
        assert_eq!(config.parent, "base");
        assert_eq!(config.parent_owner, "alice");
        assert_eq!(config.parent_version, "1.0");
        assert_eq!(config.version, "2.0");
        assert_eq!(config.pref_size, "1024");
        assert_eq!(config.description, "a child template");
        assert!(config.tags.is_empty());
    }

    #[test]
    fn test_parse_keys_are_case_insensitive() {
        let config = TemplateConfig::parse("  LXC.UTSNAME=Foo  \nSubutai.Tags = X,Y");
        assert_eq!(config.name, "foo");
        assert_eq!(config.tags, "x,y");
    }

    #[test]
    fn test_required_fields_in_order() {
        let config = TemplateConfig::parse(CONFIG);
        assert!(config.check_required_fields().is_ok());

        let mut missing = config.clone();
        missing.parent_owner.clear();
        missing.name.clear();
        assert!(matches!(
            missing.check_required_fields(),
            Err(Error::MissingField("parent-owner"))
        ));
    }

    #[test]
    fn test_owner_check() {
        let config = TemplateConfig::parse(CONFIG);
        assert!(config.check_owner("alice").is_ok());
        assert!(config.check_owner("Alice").is_ok());
        assert!(matches!(
            config.check_owner("bob"),
            Err(Error::OwnerMismatch { .. })
        ));
    }

    #[test]
    fn test_format_check() {
        let mut config = TemplateConfig::parse(CONFIG);
        assert!(config.check_format().is_ok());
        config.version = "2.0 beta".to_string();
        assert!(matches!(
            config.check_format(),
            Err(Error::InvalidFormat {
                field: "version",
                ..
            })
        ));
    }

    #[test]
    fn test_root_template_needs_no_parent() {
        let config = TemplateConfig::parse(
            "lxc.utsname = base\nsubutai.parent = base\nsubutai.parent.owner = alice\n",
        );
        assert!(config.is_root());
        assert!(config.required_parent().is_none());

        let child = TemplateConfig::parse(CONFIG);
        assert_eq!(
            child.required_parent(),
            Some(ParentRef {
                name: "base".to_string(),
                owner: "alice".to_string(),
                version: "1.0".to_string(),
            })
        );
    }
}
