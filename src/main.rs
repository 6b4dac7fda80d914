use clap::{Parser, Subcommand};
use rdt_udp::config::ClientConfig;
use rdt_udp::{Client, Config, Server};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "rdt-udp")]
#[command(about = "Reliable stop-and-wait file transfer over UDP")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the transfer server
    Server {
        /// Bind address override
        #[arg(long)]
        bind: Option<String>,

        /// Port override
        #[arg(long)]
        port: Option<u16>,

        /// Storage directory override
        #[arg(long)]
        storage_dir: Option<String>,

        /// Drop this percentage of incoming datagrams (loss testing)
        #[arg(long)]
        drop_rate_percent: Option<u8>,
    },
    /// Upload a local file to the server
    Upload {
        /// Server address override (host:port)
        #[arg(long)]
        server: Option<String>,

        /// Local file to upload
        file: PathBuf,
    },
    /// Download a file from the server into the working directory
    Download {
        /// Server address override (host:port)
        #[arg(long)]
        server: Option<String>,

        /// Name of the remote file
        file: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Info level by default; RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_create(&cli.config)?;

    match cli.command {
        Commands::Server {
            bind,
            port,
            storage_dir,
            drop_rate_percent,
        } => {
            if let Some(bind) = bind {
                config.server.address = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(storage_dir) = storage_dir {
                config.server.storage_directory = storage_dir;
            }
            if let Some(rate) = drop_rate_percent {
                config.server.drop_rate_percent = rate;
            }

            let mut server = Server::bind(&config.server)?;
            println!("RDT-UDP transfer server");
            println!("Listening on: {}", server.local_addr()?);
            println!("Storage directory: {}", config.server.storage_directory);
            println!("Server is running. Press Ctrl+C to stop.");
            server.run()?;
        }
        Commands::Upload { server, file } => {
            let addr = resolve_server(server.as_deref(), &config.client)?;
            info!(server = %addr, file = %file.display(), "uploading");

            let mut client = Client::connect(addr)?;
            client.configure(&config.client);
            client.upload(&file)?;
        }
        Commands::Download { server, file } => {
            let addr = resolve_server(server.as_deref(), &config.client)?;
            info!(server = %addr, file = %file, "downloading");

            let mut client = Client::connect(addr)?;
            client.configure(&config.client);
            client.download(&file)?;
        }
    }

    Ok(())
}

/// Pick the server address: an explicit `host:port` argument wins over the
/// configuration file.
fn resolve_server(
    override_addr: Option<&str>,
    config: &ClientConfig,
) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let target = match override_addr {
        Some(addr) => addr.to_string(),
        None => format!("{}:{}", config.server_address, config.server_port),
    };
    target
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("cannot resolve server address: {target}").into())
}
