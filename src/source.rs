use std::io::{Error, ErrorKind};
use std::path::Path;

/// A loaded source buffer. The text is read once and kept for the
/// whole compilation run; diagnostics map byte offsets back to
/// line/column through the precomputed line-start table.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub text: String,
}

impl Source {
    pub fn read(file_path: &str) -> std::io::Result<Self> {
        if Path::new(file_path).exists() {
            let text = std::fs::read_to_string(file_path)?;
            return Ok(Self {
                name: file_path.to_string(),
                text,
            });
        }
        Err(Error::new(ErrorKind::NotFound, "file does not exist"))
    }

    pub fn from_str(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
        }
    }
}

/// Byte offsets of the start of each line.
pub fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::line_starts;

    #[test]
    fn test_line_starts_basic() {
        assert_eq!(line_starts("ab\ncd\n"), vec![0, 3, 6]);
    }

    #[test]
    fn test_line_starts_no_trailing_newline() {
        assert_eq!(line_starts("ab"), vec![0]);
    }
}
