use console::style;
use std::fmt::Display;

/// Terminal styling that can be switched off (`--no-color`, JSON output,
/// non-tty sinks). Disabled palettes return the text untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub const fn plain() -> Self {
        Self { enabled: false }
    }

    /// Green bold: passed steps and checks, healthy status
    pub fn success<D: Display>(self, text: D) -> String {
        style(text)
            .force_styling(self.enabled)
            .green()
            .bold()
            .to_string()
    }

    /// Red bold: failures, fatal status
    pub fn failure<D: Display>(self, text: D) -> String {
        style(text)
            .force_styling(self.enabled)
            .red()
            .bold()
            .to_string()
    }

    /// Yellow: degraded status, informational misses
    pub fn warn<D: Display>(self, text: D) -> String {
        style(text).force_styling(self.enabled).yellow().to_string()
    }

    /// White bold: section headers
    pub fn header<D: Display>(self, text: D) -> String {
        style(text)
            .force_styling(self.enabled)
            .white()
            .bold()
            .to_string()
    }

    /// Dim: durations, attempts, skip reasons
    pub fn dim<D: Display>(self, text: D) -> String {
        style(text).force_styling(self.enabled).dim().to_string()
    }

    /// Cyan: identifiers
    pub fn accent<D: Display>(self, text: D) -> String {
        style(text).force_styling(self.enabled).cyan().to_string()
    }
}
