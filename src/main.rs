//! filebench command-line entry point.
//!
//! - `server` serves random files from a directory until the last client
//!   disconnects or a stop signal arrives
//! - `client` fetches files from a server and reports throughput
//! - `generate` writes synthetic files to serve

use filebench::catalog::FileCatalog;
use filebench::client::Client;
use filebench::config::{ClientConfig, Config, GenerateConfig, Mode, ServerConfig};
use filebench::fixtures;
use filebench::runtime::Engine;
use filebench::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match config.mode {
        Mode::Server(server) => run_server(server),
        Mode::Client(client) => run_client(client),
        Mode::Generate(generate) => run_generate(generate),
    }
}

fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::new(config.workers)?;
    info!(
        listen = %config.listen,
        dir = %config.dir.display(),
        workers = engine.workers(),
        "Starting filebench server"
    );

    let mut catalog = FileCatalog::new(&config.dir);
    catalog.attach()?;

    let report = engine.block_on(async {
        let server = Server::bind(config.listen, catalog, engine.shutdown())?;
        Ok::<_, std::io::Error>(server.run().await)
    })?;

    if report.is_none() {
        info!("Server stopped before any client connected");
    }
    Ok(())
}

fn run_client(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::new(config.workers)?;
    info!(
        connect = %config.connect,
        output = %config.output.display(),
        files = config.files,
        workers = engine.workers(),
        "Starting filebench client"
    );

    let client = Client::new(
        config.connect,
        config.output,
        config.files,
        engine.shutdown(),
    );
    engine.block_on(client.run())?;
    Ok(())
}

fn run_generate(config: GenerateConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.clean && config.dir.is_dir() {
        let removed = fixtures::clean_dir(&config.dir)?;
        info!(dir = %config.dir.display(), removed, "Removed existing files");
    }

    let paths = fixtures::generate_files(&config.dir, &config.text, config.size, config.count)?;
    info!(
        dir = %config.dir.display(),
        files = paths.len(),
        "Files generated"
    );
    Ok(())
}
