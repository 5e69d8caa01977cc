// JAR manifest main section

use super::ArchiveIndex;
use crate::error::{Result, ShrinkError};

/// Conventional manifest location
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Manifest attributes whose values name classes to keep
const CLASS_ATTRIBUTES: &[&str] = &[
    "Main-Class",
    "Premain-Class",
    "Agent-Class",
    "Launcher-Agent-Class",
];

/// Main-section attributes of a manifest, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
}

impl Manifest {
    /// Parse the main section; per-entry sections after the first blank line are ignored
    pub fn parse(text: &str) -> Self {
        let mut attributes: Vec<(String, String)> = Vec::new();

        for line in manifest_lines(text) {
            if line.is_empty() {
                break;
            }

            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some((_, value)) = attributes.last_mut() {
                    value.push_str(continuation);
                }
                continue;
            }

            if let Some((name, value)) = line.split_once(':') {
                attributes.push((name.trim().to_string(), value.trim_start().to_string()));
            }
        }

        Self { attributes }
    }

    /// Read the manifest member of an archive, if there is one
    pub fn read(index: &ArchiveIndex) -> Result<Option<Self>> {
        let Some(member) = index.get(MANIFEST_PATH) else {
            return Ok(None);
        };

        let data = member.data()?;
        let text = std::str::from_utf8(&data).map_err(|e| {
            ShrinkError::corrupt(format!("{}: manifest is not valid UTF-8: {}", MANIFEST_PATH, e))
        })?;
        Ok(Some(Self::parse(text)))
    }

    /// Attribute value; names compare case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim_end())
            .filter(|value| !value.is_empty())
    }

    pub fn main_class(&self) -> Option<&str> {
        self.get("Main-Class")
    }

    /// Binary class names named by launcher and agent attributes
    pub fn referenced_classes(&self) -> Vec<&str> {
        CLASS_ATTRIBUTES
            .iter()
            .filter_map(|attribute| self.get(attribute))
            .collect()
    }
}

/// Lines of a manifest; `CR LF`, `LF` and a bare `CR` all end a line
fn manifest_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let (line, next) = match rest.find(&['\r', '\n'][..]) {
            Some(end) if rest[end..].starts_with("\r\n") => (&rest[..end], &rest[end + 2..]),
            Some(end) => (&rest[..end], &rest[end + 1..]),
            None => (rest, ""),
        };
        rest = next;
        Some(line)
    })
}
