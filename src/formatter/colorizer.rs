//! Terminal colors for audit output
//!
//! Colors are applied with `nu-ansi-term` and can be switched off, in which
//! case every method returns its input unchanged.

use nu_ansi_term::{Color, Style};

use crate::runner::ResultCode;

/// Color scheme for terminal output
#[derive(Debug, Clone, Copy)]
pub struct Colorizer {
    enabled: bool,
}

impl Colorizer {
    /// Create a new colorizer
    ///
    /// # Arguments
    /// * `enabled` - Enable color output
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.enabled {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Green text
    pub fn success(&self, text: &str) -> String {
        self.paint(Style::new().fg(Color::Green), text)
    }

    /// Red text prefixed with `Error:`
    pub fn error(&self, text: &str) -> String {
        self.paint(Style::new().fg(Color::Red), &format!("Error: {text}"))
    }

    /// Red text
    pub fn failure(&self, text: &str) -> String {
        self.paint(Style::new().fg(Color::Red), text)
    }

    /// Yellow text
    pub fn warning(&self, text: &str) -> String {
        self.paint(Style::new().fg(Color::Yellow), text)
    }

    /// Dimmed text
    pub fn dim(&self, text: &str) -> String {
        self.paint(Style::new().fg(Color::DarkGray), text)
    }

    /// Bold text
    pub fn bold(&self, text: &str) -> String {
        self.paint(Style::new().bold(), text)
    }

    /// Label of a result code in its color
    pub fn result_code(&self, code: ResultCode) -> String {
        let label = code.to_string();
        match code {
            ResultCode::Pass => self.success(&label),
            ResultCode::Fail => self.paint(Style::new().fg(Color::Red).bold(), &label),
            ResultCode::Warning => self.warning(&label),
            ResultCode::Omitted => self.dim(&label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_colorizer_is_identity() {
        let colorizer = Colorizer::new(false);
        assert_eq!(colorizer.success("ok"), "ok");
        assert_eq!(colorizer.error("boom"), "Error: boom");
        assert_eq!(colorizer.result_code(ResultCode::Fail), "failed");
    }

    #[test]
    fn test_enabled_colorizer_emits_escape_codes() {
        let colorizer = Colorizer::new(true);
        let painted = colorizer.result_code(ResultCode::Pass);
        assert!(painted.contains("\x1b["));
        assert!(painted.contains("passed"));
    }
}
