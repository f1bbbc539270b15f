use crate::SubjectType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A supported subject file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectFormat {
    /// The subject type files of this format open as.
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    /// File extensions (without the leading dot).
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Syntax highlighting language id (code subjects only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Human readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SubjectFormat {
    /// Create a format for a subject type with the given extensions.
    pub fn new(subject_type: SubjectType, extensions: &[&str]) -> Self {
        Self {
            subject_type,
            extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
            language: None,
            label: None,
        }
    }

    /// Create a code format with a language id and label.
    pub fn code(extensions: &[&str], language: &str, label: &str) -> Self {
        Self {
            language: Some(language.to_string()),
            label: Some(label.to_string()),
            ..Self::new(SubjectType::Code, extensions)
        }
    }
}

/// The list of supported subject formats plus the lookup tables derived from it.
///
/// The derived tables are rebuilt whenever the list is replaced, so lookups stay O(1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SubjectFormat>", into = "Vec<SubjectFormat>")]
pub struct SubjectFormats {
    formats: Vec<SubjectFormat>,
    by_extension: HashMap<String, usize>,
}

impl SubjectFormats {
    /// Build the lookup tables for a list of formats.
    ///
    /// When two formats claim the same extension, the later one wins.
    pub fn new(formats: Vec<SubjectFormat>) -> Self {
        let mut by_extension = HashMap::new();
        for (idx, format) in formats.iter().enumerate() {
            for extension in &format.extensions {
                by_extension.insert(extension.to_ascii_lowercase(), idx);
            }
        }
        Self {
            formats,
            by_extension,
        }
    }

    /// All formats, in declaration order.
    pub fn formats(&self) -> &[SubjectFormat] {
        &self.formats
    }

    /// Formats that open as code subjects.
    pub fn code_formats(&self) -> impl Iterator<Item = &SubjectFormat> {
        self.formats
            .iter()
            .filter(|format| format.subject_type == SubjectType::Code)
    }

    /// Every extension any format claims, in declaration order.
    pub fn file_extensions(&self) -> Vec<&str> {
        self.formats
            .iter()
            .flat_map(|format| format.extensions.iter().map(String::as_str))
            .collect()
    }

    /// Look up a format by file extension (case-insensitive, without the dot).
    pub fn format_for_extension(&self, extension: &str) -> Option<&SubjectFormat> {
        self.by_extension
            .get(&extension.to_ascii_lowercase())
            .and_then(|idx| self.formats.get(*idx))
    }

    /// Look up a format by file name.
    pub fn format_for_filename(&self, filename: &str) -> Option<&SubjectFormat> {
        extension_from_filename(filename).and_then(|ext| self.format_for_extension(ext))
    }
}

impl From<Vec<SubjectFormat>> for SubjectFormats {
    fn from(formats: Vec<SubjectFormat>) -> Self {
        Self::new(formats)
    }
}

impl From<SubjectFormats> for Vec<SubjectFormat> {
    fn from(formats: SubjectFormats) -> Self {
        formats.formats
    }
}

impl Default for SubjectFormats {
    fn default() -> Self {
        Self::new(vec![
            SubjectFormat::code(&["cpp", "cxx"], "cpp", "C++"),
            SubjectFormat::code(&["css"], "css", "CSS"),
            SubjectFormat::code(&["go"], "go", "Go"),
            SubjectFormat::code(&["html"], "html", "HTML"),
            SubjectFormat::code(&["java", "class"], "java", "Java"),
            SubjectFormat::code(&["js", "jsx"], "javascript", "JavaScript"),
            SubjectFormat::code(&["json"], "json", "JSON"),
            SubjectFormat::code(&["kr"], "kotlin", "Kotlin"),
            SubjectFormat::code(&["md"], "markdown", "Markdown"),
            SubjectFormat::code(&["php"], "php", "PHP"),
            SubjectFormat::code(&["py", "python"], "python", "Python"),
            SubjectFormat::code(&["rb", "ruby", "rake"], "ruby", "Ruby"),
            SubjectFormat::code(&["sh", "bash"], "shell", "Shell"),
            SubjectFormat::code(&["swift"], "swift", "Swift"),
            SubjectFormat::code(&["rs", "rust"], "rust", "Rust"),
            SubjectFormat::code(&["ts", "tsx"], "typescript", "TypeScript"),
            SubjectFormat::code(&["txt"], "", "Text"),
            SubjectFormat::code(&["xml"], "xml", "XML"),
            SubjectFormat::code(&["yaml", "yml", "syntax"], "yaml", "YAML"),
            SubjectFormat::new(SubjectType::Math, &["tex", "latex"]),
            SubjectFormat::new(SubjectType::Image, &["png", "jpg", "jpeg", "gif", "webp"]),
        ])
    }
}

/// Extract the extension (text after the last `.`) from a file name.
///
/// Returns `None` when the name has no extension.
pub fn extension_from_filename(filename: &str) -> Option<&str> {
    let (stem, extension) = filename.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_filename() {
        assert_eq!(extension_from_filename("file.js"), Some("js"));
        assert_eq!(extension_from_filename("file-final_v2.js"), Some("js"));
        assert_eq!(extension_from_filename("åäö.xml"), Some("xml"));
        assert_eq!(extension_from_filename("Makefile"), None);
        assert_eq!(extension_from_filename(".gitignore"), None);
    }

    #[test]
    fn test_lookup_by_filename() {
        let formats = SubjectFormats::default();
        let format = formats.format_for_filename("main.TS").unwrap();
        assert_eq!(format.language.as_deref(), Some("typescript"));

        let image = formats.format_for_filename("diagram.png").unwrap();
        assert_eq!(image.subject_type, SubjectType::Image);

        assert!(formats.format_for_filename("archive.zip").is_none());
    }

    #[test]
    fn test_derived_tables() {
        let formats = SubjectFormats::new(vec![
            SubjectFormat::code(&["a"], "lang-a", "A"),
            SubjectFormat::new(SubjectType::Image, &["png"]),
            SubjectFormat::code(&["b", "a"], "lang-b", "B"),
        ]);

        assert_eq!(formats.code_formats().count(), 2);
        assert_eq!(formats.file_extensions(), vec!["a", "png", "b", "a"]);
        assert_eq!(
            formats.format_for_extension("a").unwrap().language.as_deref(),
            Some("lang-b")
        );
    }
}
