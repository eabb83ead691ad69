//! Table rendering of audit results using tabled

use tabled::{
    Table,
    builder::Builder,
    settings::{
        Alignment, Color, Modify, Style,
        object::{Cell, Columns, Rows},
        width::Width,
    },
};

use crate::catalog::TestDefinition;
use crate::runner::{ResultCode, TestResult};

/// Maximum width of the message column (characters)
const DEFAULT_MAX_MESSAGE_WIDTH: usize = 60;

/// Maximum width of the title column (characters)
const DEFAULT_MAX_TITLE_WIDTH: usize = 40;

/// Column holding the result label in the results table
const RESULT_COLUMN: usize = 3;

/// Table formatter for results and catalog listings
pub struct TableFormatter {
    max_message_width: usize,
    use_colors: bool,
}

impl TableFormatter {
    /// Create a new table formatter
    ///
    /// # Arguments
    /// * `use_colors` - Color headers and result cells
    pub fn new(use_colors: bool) -> Self {
        Self {
            max_message_width: DEFAULT_MAX_MESSAGE_WIDTH,
            use_colors,
        }
    }

    /// Set maximum width of the message column
    pub fn with_max_message_width(mut self, width: usize) -> Self {
        self.max_message_width = width;
        self
    }

    /// Render one row per result
    ///
    /// # Arguments
    /// * `results` - Results in run order
    ///
    /// # Returns
    /// * `String` - Rendered table
    pub fn format_results(&self, results: &[TestResult]) -> String {
        let mut builder = Builder::default();
        builder.push_record(["#", "Test", "Severity", "Result", "Message"]);

        for (index, result) in results.iter().enumerate() {
            builder.push_record([
                (index + 1).to_string(),
                result.title.clone(),
                result.severity.to_string(),
                result.result.to_string(),
                result.message.clone(),
            ]);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        table.with(Modify::new(Columns::new(1..=1)).with(Width::wrap(DEFAULT_MAX_TITLE_WIDTH)));
        table.with(Modify::new(Columns::new(4..=4)).with(Width::wrap(self.max_message_width)));

        if self.use_colors {
            for (index, result) in results.iter().enumerate() {
                table.modify(Cell::new(index + 1, RESULT_COLUMN), result_color(result.result));
            }
        }

        table.to_string()
    }

    /// Render the tests of a suite without running them
    ///
    /// # Arguments
    /// * `tests` - Suite in evaluation order
    ///
    /// # Returns
    /// * `String` - Rendered table
    pub fn format_tests(&self, tests: &[TestDefinition]) -> String {
        let mut builder = Builder::default();
        builder.push_record(["#", "Id", "Severity", "Title", "Stops suite"]);

        for (index, test) in tests.iter().enumerate() {
            let stops = match test.breaks {
                Some(true) => "on pass",
                Some(false) => "on failure",
                None => "",
            };
            builder.push_record([
                (index + 1).to_string(),
                test.id.clone(),
                test.severity.to_string(),
                test.title.clone(),
                stops.to_string(),
            ]);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        table.with(Modify::new(Columns::new(3..=3)).with(Width::wrap(self.max_message_width)));
        table.to_string()
    }

    fn apply_style(&self, table: &mut Table) {
        table.with(Style::modern());
        table.with(Modify::new(Rows::first()).with(Alignment::center()));
        if self.use_colors {
            table.modify(Rows::first(), Color::FG_CYAN | Color::BOLD);
        }
    }
}

fn result_color(code: ResultCode) -> Color {
    match code {
        ResultCode::Pass => Color::FG_GREEN,
        ResultCode::Fail => Color::FG_RED | Color::BOLD,
        ResultCode::Warning => Color::FG_YELLOW,
        ResultCode::Omitted => Color::FG_BRIGHT_BLACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Severity, Suite};

    fn result(title: &str, code: ResultCode, message: &str) -> TestResult {
        TestResult {
            id: title.to_lowercase(),
            severity: Severity::High,
            title: title.into(),
            caption: String::new(),
            message: message.into(),
            result: code,
            extra: None,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_results_table_has_one_row_per_result() {
        let formatter = TableFormatter::new(false);
        let output = formatter.format_results(&[
            result("Domain exists", ResultCode::Pass, "Well done."),
            result("Roles", ResultCode::Fail, "Your user holds [dbOwner]."),
        ]);

        assert!(output.contains("Domain exists"));
        assert!(output.contains("passed"));
        assert!(output.contains("failed"));
        assert!(output.contains("dbOwner"));
    }

    #[test]
    fn test_long_messages_are_wrapped() {
        let formatter = TableFormatter::new(false).with_max_message_width(20);
        let message = "word ".repeat(30);
        let output = formatter.format_results(&[result("Long", ResultCode::Warning, &message)]);
        assert!(output.lines().count() > 5);
    }

    #[test]
    fn test_tests_table_marks_breaking_tests() {
        let tests = Catalog::builtin().unwrap().suite(Suite::Basic);
        let output = TableFormatter::new(false).format_tests(&tests);
        assert!(output.contains("domain_exists"));
        assert!(output.contains("on failure"));
    }
}
