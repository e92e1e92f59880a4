use crate::error::{ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};

const VERSION: &str = "Version";
const ARCHITECTURE: &str = "Architecture";
const PACKAGE: &str = "Package";

/// The typed contents of a package's `control` file.
///
/// Keys are case-sensitive and kept in source order so that the paragraph can
/// be re-emitted verbatim into a `Packages` index. Multi-line values (such as
/// `Description`) keep their continuation lines, including the leading
/// whitespace that marks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMetadata {
    version: String,
    architecture: String,
    fields: Vec<(String, String)>,
}

impl ControlMetadata {
    /// Parses the first paragraph of a control file.
    ///
    /// # Errors
    /// - [`ErrorKind::MalformedLine`] for a line that is neither `Key: value`
    ///   nor a continuation of the previous field.
    /// - [`ErrorKind::MissingField`] when `Version` or `Architecture` is absent
    ///   or empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use jewel_deb::ControlMetadata;
    ///
    /// let control = ControlMetadata::parse("Package: demo\nVersion: 1.0.0\nArchitecture: arm64\n").unwrap();
    /// assert_eq!(control.version(), "1.0.0");
    /// assert_eq!(control.architecture(), "arm64");
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut fields: Vec<(String, String)> = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                // Blank line ends the paragraph; leading blank lines are noise.
                if fields.is_empty() {
                    continue;
                }
                break;
            }
            if line.starts_with([' ', '\t']) {
                let Some((_, value)) = fields.last_mut() else {
                    exn::bail!(ErrorKind::MalformedLine { line: index + 1, content: line.to_string() });
                };
                value.push('\n');
                value.push_str(line.trim_end());
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                exn::bail!(ErrorKind::MalformedLine { line: index + 1, content: line.to_string() });
            };
            if key.is_empty() || key.contains(char::is_whitespace) {
                exn::bail!(ErrorKind::MalformedLine { line: index + 1, content: line.to_string() });
            }
            fields.push((key.to_string(), value.trim().to_string()));
        }
        let required = |name: &'static str| -> Result<String> {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| exn::Exn::from(ErrorKind::MissingField(name)))
        };
        let version = required(VERSION)?;
        let architecture = required(ARCHITECTURE)?;
        Ok(Self { version, architecture, fields })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn package(&self) -> Option<&str> {
        self.get(PACKAGE)
    }

    /// Case-sensitive lookup of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// All fields in source order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders the paragraph as `Key: value` lines, without a trailing blank line.
impl Display for ControlMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (key, value) in &self.fields {
            if value.is_empty() || value.starts_with('\n') {
                writeln!(f, "{key}:{value}")?;
            } else {
                writeln!(f, "{key}: {value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CONTROL: &str = "\
Package: jewel-desktop
Version: 3.4.1
Architecture: amd64
Maintainer: Release Team <release@example.com>
Depends: libc6 (>= 2.31), libgtk-3-0
Description: Desktop client
 Long description line one.
 .
 Line after paragraph break.
";

    #[test]
    fn test_parse_required_fields() {
        let control = ControlMetadata::parse(CONTROL).unwrap();
        assert_eq!(control.version(), "3.4.1");
        assert_eq!(control.architecture(), "amd64");
        assert_eq!(control.package(), Some("jewel-desktop"));
        assert_eq!(control.get("Depends"), Some("libc6 (>= 2.31), libgtk-3-0"));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let control = ControlMetadata::parse(CONTROL).unwrap();
        assert_eq!(control.get("version"), None);
        let err = ControlMetadata::parse("version: 1.0\nArchitecture: amd64\n").unwrap_err();
        assert_eq!(*err, ErrorKind::MissingField("Version"));
    }

    #[test]
    fn test_continuation_lines() {
        let control = ControlMetadata::parse(CONTROL).unwrap();
        assert_eq!(
            control.get("Description"),
            Some("Desktop client\n Long description line one.\n .\n Line after paragraph break.")
        );
    }

    #[test]
    fn test_render_is_verbatim() {
        let control = ControlMetadata::parse(CONTROL).unwrap();
        assert_eq!(control.to_string(), CONTROL);
    }

    #[test]
    fn test_value_containing_colons() {
        let control =
            ControlMetadata::parse("Version: 1:2.0-1\nArchitecture: all\nHomepage: https://example.com\n").unwrap();
        assert_eq!(control.version(), "1:2.0-1");
        assert_eq!(control.get("Homepage"), Some("https://example.com"));
    }

    #[test]
    fn test_only_first_paragraph() {
        let control = ControlMetadata::parse("\nVersion: 1\nArchitecture: arm64\n\nVersion: 2\n").unwrap();
        assert_eq!(control.version(), "1");
        assert_eq!(control.fields().count(), 2);
    }

    #[rstest]
    #[case("Architecture: amd64\n", "Version")]
    #[case("Version: 1.0\n", "Architecture")]
    #[case("Version:\nArchitecture: amd64\n", "Version")]
    #[case("Version: 1.0\nArchitecture:   \n", "Architecture")]
    fn test_missing_required(#[case] text: &str, #[case] field: &'static str) {
        let err = ControlMetadata::parse(text).unwrap_err();
        assert_eq!(*err, ErrorKind::MissingField(field));
    }

    #[rstest]
    #[case(" leading continuation\nVersion: 1\n", 1)]
    #[case("Version: 1\nnot a field\n", 2)]
    #[case("Version: 1\nBad Key: x\n", 2)]
    #[case("Version: 1\n: empty key\n", 2)]
    fn test_malformed_lines(#[case] text: &str, #[case] expected_line: usize) {
        let err = ControlMetadata::parse(text).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedLine { line, .. } if *line == expected_line));
    }
}
