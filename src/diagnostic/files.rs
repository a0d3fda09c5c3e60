//! File registry backing span-to-location lookups.

use crate::source::{line_starts, Source};

/// Opaque index into the file registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// A one-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

struct FileEntry {
    name: String,
    text: String,
    line_starts: Vec<usize>,
}

/// Owns every loaded source file for the compilation run and maps
/// byte offsets back to lines and columns.
#[derive(Default)]
pub struct Files {
    entries: Vec<FileEntry>,
}

impl Files {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, source: &Source) -> FileId {
        let id = FileId(self.entries.len() as u32);
        self.entries.push(FileEntry {
            name: source.name.clone(),
            text: source.text.clone(),
            line_starts: line_starts(&source.text),
        });
        id
    }

    pub fn name(&self, file: FileId) -> &str {
        &self.entries[file.0 as usize].name
    }

    pub fn text(&self, file: FileId) -> &str {
        &self.entries[file.0 as usize].text
    }

    pub fn location(&self, file: FileId, offset: u32) -> Location {
        let entry = &self.entries[file.0 as usize];
        let offset = offset as usize;
        let line_idx = match entry.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = entry.line_starts[line_idx];
        let column = entry.text[line_start..offset.min(entry.text.len())]
            .chars()
            .count();
        Location {
            line: line_idx + 1,
            column: column + 1,
        }
    }

    /// The full text of the 1-indexed line, without its newline.
    pub fn line_text(&self, file: FileId, line: usize) -> Option<&str> {
        let entry = &self.entries[file.0 as usize];
        let start = *entry.line_starts.get(line - 1)?;
        let end = entry
            .line_starts
            .get(line)
            .map(|s| s - 1)
            .unwrap_or(entry.text.len());
        Some(entry.text[start..end].trim_end_matches('\r'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_lookup() {
        let mut files = Files::new();
        let id = files.add(&Source::from_str("t.prv", "abc\ndef\n"));
        assert_eq!(files.location(id, 0), Location { line: 1, column: 1 });
        assert_eq!(files.location(id, 5), Location { line: 2, column: 2 });
    }

    #[test]
    fn test_line_text() {
        let mut files = Files::new();
        let id = files.add(&Source::from_str("t.prv", "abc\ndef"));
        assert_eq!(files.line_text(id, 1), Some("abc"));
        assert_eq!(files.line_text(id, 2), Some("def"));
        assert_eq!(files.line_text(id, 3), None);
    }
}
