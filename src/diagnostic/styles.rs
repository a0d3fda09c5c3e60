//! ANSI color configuration for terminal output.

use super::Severity;

/// Whether to emit ANSI escape codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConfig {
    Auto,
    Always,
    Never,
}

impl ColorConfig {
    pub fn enabled(&self) -> bool {
        match self {
            ColorConfig::Always => true,
            ColorConfig::Never => false,
            ColorConfig::Auto => std::env::var_os("NO_COLOR").is_none(),
        }
    }
}

pub const BOLD: &str = "\x1b[1m";
pub const BLUE: &str = "\x1b[1;34m";
pub const RESET: &str = "\x1b[0m";

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "\x1b[1;31m",
        Severity::Warning => "\x1b[1;33m",
        Severity::Note => "\x1b[1;36m",
    }
}
