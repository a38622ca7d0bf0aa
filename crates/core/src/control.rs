//! Debian control file fields.

/// Fields extracted from a package's `control` file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlFields {
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub description: String,
}

impl ControlFields {
    /// Parse `Key: value` lines.
    ///
    /// Keys are matched case-sensitively. Continuation lines (starting with
    /// whitespace) are skipped, so multi-line descriptions keep their synopsis only.
    pub fn parse(text: &str) -> Self {
        let mut fields = Self::default();
        for line in text.lines() {
            if line.starts_with([' ', '\t']) {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim_start().trim_end_matches('\r').to_string();
            match key {
                "Package" => fields.package = value,
                "Version" => fields.version = value,
                "Architecture" => fields.architecture = value,
                "Description" => fields.description = value,
                _ => {}
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let fields = ControlFields::parse("Architecture: amd64\nVersion: 1.2\n");
        assert_eq!(fields.architecture, "amd64");
        assert_eq!(fields.version, "1.2");
        assert!(fields.description.is_empty());
    }

    #[test]
    fn test_parse_full_control() {
        let text = "Package: hello\n\
                    Version: 2:1.0-1\n\
                    Architecture: arm64\n\
                    Maintainer: Someone <a@b.c>\n\
                    Description: greets the world\n \
                    Longer text that spans\n \
                    .\n";
        let fields = ControlFields::parse(text);
        assert_eq!(fields.package, "hello");
        assert_eq!(fields.version, "2:1.0-1");
        assert_eq!(fields.architecture, "arm64");
        assert_eq!(fields.description, "greets the world");
    }

    #[test]
    fn test_parse_ignores_garbage() {
        let fields = ControlFields::parse("no colon here\n\n:empty key\n");
        assert_eq!(fields, ControlFields::default());
    }
}
