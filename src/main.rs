use anyhow::Result;
use clap::Parser;
use etcd_wrapper::config::{
    default_client_port, default_ready_port, ClientTlsConfig, SidecarConfig, WrapperConfig,
};
use etcd_wrapper::{Application, CrashMarker, ShutdownCoordinator};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "etcd-wrapper")]
#[command(about = "Startup coordinator for an etcd member managed by a backup-restore sidecar")]
#[command(version)]
#[command(long_about = "Runs the initialization handshake with the backup-restore sidecar, \
starts etcd with the configuration the sidecar provides and serves a readiness endpoint. \
Shutdown signals are recorded so the next start can pick the right validation depth.")]
struct Args {
    /// Sidecar address without scheme
    #[arg(long, env = "ETCD_WRAPPER_SIDECAR_HOST_PORT", default_value = ":8080", value_name = "HOST:PORT")]
    sidecar_host_port: String,

    /// Talk to the sidecar over TLS
    #[arg(long, env = "ETCD_WRAPPER_SIDECAR_TLS_ENABLED")]
    sidecar_tls_enabled: bool,

    /// CA bundle trusted for the sidecar's certificate
    #[arg(long, env = "ETCD_WRAPPER_SIDECAR_CA_CERT_BUNDLE", value_name = "PATH")]
    sidecar_ca_cert_bundle: Option<PathBuf>,

    /// Server name expected on etcd's client certificate
    #[arg(long, env = "ETCD_WRAPPER_ETCD_SERVER_NAME")]
    etcd_server_name: Option<String>,

    #[arg(long, env = "ETCD_WRAPPER_ETCD_CLIENT_CA", value_name = "PATH")]
    etcd_client_ca: Option<PathBuf>,

    #[arg(long, env = "ETCD_WRAPPER_ETCD_CLIENT_CERT", value_name = "PATH")]
    etcd_client_cert: Option<PathBuf>,

    #[arg(long, env = "ETCD_WRAPPER_ETCD_CLIENT_KEY", value_name = "PATH")]
    etcd_client_key: Option<PathBuf>,

    /// Port of the readiness server
    #[arg(long, env = "ETCD_WRAPPER_READY_PORT", default_value_t = default_ready_port())]
    ready_port: u16,

    /// Client port of the local etcd member
    #[arg(long, env = "ETCD_WRAPPER_CLIENT_PORT", default_value_t = default_client_port())]
    client_port: u16,

    /// Seconds to wait for etcd to become ready, 0 waits forever
    #[arg(long, env = "ETCD_WRAPPER_WAIT_READY_TIMEOUT", default_value_t = 0, value_name = "SECONDS")]
    wait_ready_timeout: u64,

    /// File recording the signal that ended the previous run
    #[arg(long, env = "ETCD_WRAPPER_CRASH_MARKER", value_name = "PATH")]
    crash_marker_path: Option<PathBuf>,

    /// Where the etcd configuration fetched from the sidecar is written
    #[arg(long, env = "ETCD_WRAPPER_ETCD_CONFIG", value_name = "PATH")]
    etcd_config_path: Option<PathBuf>,

    /// etcd executable
    #[arg(long, env = "ETCD_WRAPPER_ETCD_BINARY")]
    etcd_binary: Option<String>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, env = "ETCD_WRAPPER_LOG_FORMAT", value_name = "FORMAT")]
    log_format: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate the effective configuration and exit")]
    validate_config: bool,

    /// Print the effective configuration and exit
    #[arg(long, help = "Print the effective configuration in TOML format and exit")]
    print_config: bool,
}

impl Args {
    fn to_config(&self) -> WrapperConfig {
        let defaults = WrapperConfig::default();
        WrapperConfig {
            ready_port: self.ready_port,
            client_port: self.client_port,
            wait_ready_timeout_seconds: self.wait_ready_timeout,
            crash_marker_path: self
                .crash_marker_path
                .clone()
                .unwrap_or(defaults.crash_marker_path),
            engine_config_path: self
                .etcd_config_path
                .clone()
                .unwrap_or(defaults.engine_config_path),
            etcd_binary: self.etcd_binary.clone().unwrap_or(defaults.etcd_binary),
            sidecar: SidecarConfig {
                host_port: self.sidecar_host_port.clone(),
                tls_enabled: self.sidecar_tls_enabled,
                ca_cert_bundle_path: self.sidecar_ca_cert_bundle.clone(),
            },
            client: ClientTlsConfig {
                server_name: self.etcd_server_name.clone(),
                ca_path: self.etcd_client_ca.clone(),
                cert_path: self.etcd_client_cert.clone(),
                key_path: self.etcd_client_key.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.to_config();

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting etcd-wrapper v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    // Armed before anything else runs so that no signal goes unrecorded
    let marker = CrashMarker::new(config.crash_marker_path.clone());
    let shutdown = ShutdownCoordinator::install(move |signal| {
        if let Err(e) = marker.capture(signal.name()) {
            error!("Failed to capture shutdown signal {}: {}", signal, e);
        }
    })?;

    let mut app = Application::new(config, shutdown.token()).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    app.run().await.map_err(|e| {
        error!("etcd-wrapper failed: {}", e);
        e
    })?;

    info!("etcd-wrapper stopped");
    Ok(())
}

fn log_level(args: &Args) -> &'static str {
    if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = log_level(args);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("etcd_wrapper={},tower_http={}", log_level, log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_target(args.verbose)
            .with_thread_ids(false)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    Ok(())
}
