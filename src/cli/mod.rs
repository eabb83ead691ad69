//! Command-line interface for mongoaudit
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Test catalog selection
//! - Subcommands that don't need a target (version, tests, config)

pub mod progress;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::catalog::{Catalog, Suite, TestDefinition};
use crate::config::{Config, OutputFormat};
use crate::error::Result;
use crate::formatter::Formatter;

pub use progress::ProgressObserver;

/// MongoDB exposure audit
#[derive(Parser, Debug)]
#[command(
    name = "mongoaudit",
    version,
    about = "Audit the security of a MongoDB server",
    long_about = "Runs a battery of checks against a MongoDB server: its perimeter without
credentials (basic suite), or its configuration and user privileges from inside
with valid credentials (advanced suite)."
)]
pub struct CliArgs {
    /// Target connection string
    ///
    /// Format: [mongodb://][username:password@]host[:port][/database][?options]
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Test suite to run
    #[arg(long, value_enum, default_value_t = SuiteArg::Basic, global = true)]
    pub suite: SuiteArg,

    /// Custom test catalog (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    pub catalog: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Output format (table, json, json-pretty)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<String>,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Pause between tests in milliseconds
    #[arg(long, value_name = "MILLISECONDS")]
    pub delay_ms: Option<u64>,

    /// Server selection and connect timeout in milliseconds
    #[arg(long, value_name = "MILLISECONDS")]
    pub timeout_ms: Option<u64>,

    /// Run the tests even when no MongoDB server answers
    #[arg(long)]
    pub force: bool,

    /// Quiet mode (no progress, errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Suite names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuiteArg {
    Basic,
    Advanced,
}

impl From<SuiteArg> for Suite {
    fn from(arg: SuiteArg) -> Self {
        match arg {
            SuiteArg::Basic => Suite::Basic,
            SuiteArg::Advanced => Suite::Advanced,
        }
    }
}

/// Subcommands for mongoaudit
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// List the tests of a suite without running them
    Tests,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;

        if let Err(e) = config.validate() {
            eprintln!("Warning: Configuration validation failed: {}", e);
            eprintln!("Using default configuration instead.");
            config = Config::default();
        }

        Self::apply_args_to_config(&mut config, args);

        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Suite selected on the command line
    pub fn suite(&self) -> Suite {
        self.args.suite.into()
    }

    /// Whether a progress spinner should be drawn
    ///
    /// JSON output is meant for pipes, so it never gets one.
    pub fn show_progress(&self) -> bool {
        !self.args.quiet && !self.config.display.format.is_json()
    }

    /// Load the test catalog
    ///
    /// A catalog given with `--catalog` or in the configuration file replaces
    /// the built-in one.
    ///
    /// # Returns
    /// * `Result<Catalog>` - Parsed and validated catalog
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.config.audit.catalog {
            Some(path) => Catalog::load(path),
            None => Catalog::builtin(),
        }
    }

    /// Tests of the selected suite, in evaluation order
    pub fn selected_tests(&self) -> Result<Vec<TestDefinition>> {
        Ok(self.load_catalog()?.suite(self.suite()))
    }

    /// Formatter matching the effective display configuration
    pub fn formatter(&self) -> Formatter {
        Formatter::new(
            self.config.display.format,
            self.config.display.color_output,
        )
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    ///
    /// # Arguments
    /// * `config` - Configuration to modify
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_display_args(config, args);
        Self::apply_logging_args(config, args);
        Self::apply_audit_args(config, args);
    }

    /// Apply display-related CLI arguments to configuration
    fn apply_display_args(config: &mut Config, args: &CliArgs) {
        if let Some(format_str) = &args.format {
            config.display.format = Self::parse_output_format(format_str);
        }

        if args.no_color {
            config.display.color_output = false;
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        use crate::config::LogLevel;

        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Apply audit and connection CLI arguments to configuration
    fn apply_audit_args(config: &mut Config, args: &CliArgs) {
        if let Some(delay) = args.delay_ms {
            config.audit.test_delay_ms = delay;
        }

        if let Some(catalog) = &args.catalog {
            config.audit.catalog = Some(catalog.clone());
        }

        // Zero would make every check fail instantly
        if let Some(timeout) = args.timeout_ms.filter(|t| *t > 0) {
            config.connection.server_selection_timeout_ms = timeout;
            config.connection.connect_timeout_ms = timeout;
        }
    }

    /// Parse output format string
    fn parse_output_format(format_str: &str) -> OutputFormat {
        match format_str.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "json-pretty" | "jsonpretty" => OutputFormat::JsonPretty,
            "table" => OutputFormat::Table,
            _ => {
                eprintln!("Warning: Unknown format '{}', using table", format_str);
                OutputFormat::Table
            }
        }
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub async fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Tests) => {
                self.list_tests()?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("mongoaudit version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Print the tests of the selected suite
    fn list_tests(&self) -> Result<()> {
        let suite = self.suite();
        let tests = self.selected_tests()?;
        println!("{}", self.formatter().format_suite(suite, &tests)?);
        Ok(())
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return;
        }

        match Config::load_from_file(Some(path.as_path())) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("Configuration is valid"),
                Err(e) => println!("Configuration validation failed: {}", e),
            },
            Err(e) => println!("Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();
        println!("=== Effective Configuration ===");
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }

    /// Print the target and the suite about to run
    ///
    /// # Arguments
    /// * `target` - Connection string with credentials hidden
    pub fn print_banner(&self, target: &str) {
        if self.show_progress() {
            println!("Auditing: {}", target);
            println!(
                "Suite: {} ({} {})",
                self.suite().title(),
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            );
        }
    }
}
