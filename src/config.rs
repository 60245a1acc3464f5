//! Configuration module for filebench.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "filebench")]
#[command(author = "filebench authors")]
#[command(version = "0.1.0")]
#[command(about = "Bulk file transfer throughput benchmark", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Serve random files from a directory
    Server(ServerArgs),
    /// Request files from a server and measure throughput
    Client(ClientArgs),
    /// Generate synthetic files to serve
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Address to bind to (e.g., 0.0.0.0:12345)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Directory of files to serve
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    /// Server address (e.g., 127.0.0.1:12345)
    #[arg(short = 's', long)]
    pub connect: Option<String>,

    /// Directory received files are written to
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of files to receive
    #[arg(short = 'n', long)]
    pub files: Option<usize>,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// Directory to write files into
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Number of files to create
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Minimum size of each file in bytes
    #[arg(short, long)]
    pub size: Option<usize>,

    /// Line of text repeated to fill each file
    #[arg(short, long)]
    pub text: Option<String>,

    /// Remove existing entries in the directory first
    #[arg(long)]
    pub clean: bool,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub generate: GenerateSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            dir: default_dir(),
            workers: default_workers(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_connect")]
    pub connect: String,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_files")]
    pub files: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect: default_connect(),
            output: default_output(),
            files: default_files(),
            workers: default_workers(),
        }
    }
}

/// Fixture generation configuration
#[derive(Debug, Deserialize)]
pub struct GenerateSection {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default)]
    pub clean: bool,
}

impl Default for GenerateSection {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            count: default_count(),
            size: default_size(),
            text: default_text(),
            clean: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:12345".to_string()
}

fn default_connect() -> String {
    "127.0.0.1:12345".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_output() -> PathBuf {
    PathBuf::from("received")
}

fn default_workers() -> usize {
    1
}

fn default_files() -> usize {
    1000
}

fn default_count() -> usize {
    128
}

fn default_size() -> usize {
    1024
}

fn default_text() -> String {
    "test string".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub dir: PathBuf,
    pub workers: usize,
}

/// Resolved client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect: SocketAddr,
    pub output: PathBuf,
    pub files: usize,
    pub workers: usize,
}

/// Resolved fixture generation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateConfig {
    pub dir: PathBuf,
    pub count: usize,
    pub size: usize,
    pub text: String,
    pub clean: bool,
}

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Server(ServerConfig),
    Client(ClientConfig),
    Generate(GenerateConfig),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve parsed CLI arguments against the optional TOML file.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = match cli.config {
            Some(ref config_path) => {
                let contents = std::fs::read_to_string(config_path)
                    .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
            }
            None => TomlConfig::default(),
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let mode = match cli.command {
            CliCommand::Server(args) => {
                let section = toml_config.server;
                let server = ServerConfig {
                    listen: parse_addr(&args.listen.unwrap_or(section.listen))?,
                    dir: args.dir.unwrap_or(section.dir),
                    workers: validate_workers(args.workers.unwrap_or(section.workers))?,
                };
                validate_dir(&server.dir)?;
                Mode::Server(server)
            }
            CliCommand::Client(args) => {
                let section = toml_config.client;
                Mode::Client(ClientConfig {
                    connect: parse_addr(&args.connect.unwrap_or(section.connect))?,
                    output: args.output.unwrap_or(section.output),
                    files: args.files.unwrap_or(section.files),
                    workers: validate_workers(args.workers.unwrap_or(section.workers))?,
                })
            }
            CliCommand::Generate(args) => {
                let section = toml_config.generate;
                let text = args.text.unwrap_or(section.text);
                if text.is_empty() {
                    return Err(ConfigError::Invalid("file text must not be empty".to_string()));
                }
                Mode::Generate(GenerateConfig {
                    dir: args.dir.unwrap_or(section.dir),
                    count: args.count.unwrap_or(section.count),
                    size: args.size.unwrap_or(section.size),
                    text,
                    clean: args.clean || section.clean,
                })
            }
        };

        Ok(Config {
            mode,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse()
        .map_err(|_| ConfigError::InvalidAddress(addr.to_string()))
}

fn validate_workers(workers: usize) -> Result<usize, ConfigError> {
    if workers == 0 {
        return Err(ConfigError::Invalid(
            "worker count must be at least 1".to_string(),
        ));
    }
    Ok(workers)
}

fn validate_dir(dir: &std::path::Path) -> Result<(), ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidAddress(String),
    NotADirectory(PathBuf),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidAddress(addr) => {
                write!(f, "Invalid socket address '{addr}'")
            }
            ConfigError::NotADirectory(path) => {
                write!(f, "'{}' does not exist or is not a directory", path.display())
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("filebench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:12345");
        assert_eq!(config.server.workers, 1);
        assert_eq!(config.client.connect, "127.0.0.1:12345");
        assert_eq!(config.client.files, 1000);
        assert_eq!(config.generate.count, 128);
        assert_eq!(config.generate.size, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9000"
            dir = "/srv/files"
            workers = 4

            [client]
            connect = "10.0.0.1:9000"
            files = 50

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.dir, PathBuf::from("/srv/files"));
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.client.connect, "10.0.0.1:9000");
        assert_eq!(config.client.files, 50);
        assert_eq!(config.client.workers, 1);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [client]
            connect = "10.0.0.1:9000"
            files = 50
            workers = 2
            "#,
        )
        .unwrap();

        let config = Config::merge(cli(&["client", "--files", "5"]), toml_config).unwrap();
        assert_eq!(
            config.mode,
            Mode::Client(ClientConfig {
                connect: "10.0.0.1:9000".parse().unwrap(),
                output: PathBuf::from("received"),
                files: 5,
                workers: 2,
            })
        );
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_server_requires_existing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");

        let result = Config::merge(
            cli(&["server", "--dir", missing.to_str().unwrap()]),
            TomlConfig::default(),
        );
        assert!(matches!(result, Err(ConfigError::NotADirectory(_))));

        let config = Config::merge(
            cli(&["server", "--dir", tmp.path().to_str().unwrap(), "-w", "3"]),
            TomlConfig::default(),
        )
        .unwrap();
        match config.mode {
            Mode::Server(server) => {
                assert_eq!(server.workers, 3);
                assert_eq!(server.listen, "0.0.0.0:12345".parse().unwrap());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_address() {
        let result = Config::merge(
            cli(&["client", "--connect", "not-an-address"]),
            TomlConfig::default(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = Config::merge(cli(&["client", "-w", "0"]), TomlConfig::default());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_log_level_flag() {
        let config = Config::merge(
            cli(&["--log-level", "debug", "generate", "-n", "3", "--clean"]),
            TomlConfig::default(),
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(matches!(
            config.mode,
            Mode::Generate(GenerateConfig {
                count: 3,
                clean: true,
                ..
            })
        ));
    }
}
