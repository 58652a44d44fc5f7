//! multiflow-proxy entry point
//!
//! # Usage
//!
//! ```bash
//! # Plain HTTP decoy on the default port
//! multiflow-proxy --port 8080
//!
//! # TLS termination with a PEM bundle
//! multiflow-proxy --https --cert /etc/multiflow/bundle.pem --port 443
//!
//! # SSH-only deployment with a nonstandard sshd port
//! multiflow-proxy --ssh-only --ssh-port 2222
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use multiflow_proxy::config::{load_config, ProxyConfig};
use multiflow_proxy::error::ConfigError;
use multiflow_proxy::server::ProxyServer;

/// Parsed command line
struct Args {
    config: ProxyConfig,
}

impl Args {
    /// Parse the command line into a configuration
    ///
    /// A `--config` file (when given) supplies the base values; every other
    /// flag overrides it.
    fn parse() -> Result<Self, ConfigError> {
        let mut args = std::env::args().skip(1);
        let mut config: Option<ProxyConfig> = None;
        let mut overrides: Vec<Box<dyn FnOnce(&mut ProxyConfig)>> = Vec::new();

        fn parse_value<T: std::str::FromStr>(
            flag: &str,
            value: Option<String>,
        ) -> Result<T, ConfigError> {
            let value = value.ok_or_else(|| ConfigError::invalid_flag(flag, "<missing>"))?;
            value
                .parse()
                .map_err(|_| ConfigError::invalid_flag(flag, value))
        }

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    let path: String = parse_value(&arg, args.next())?;
                    config = Some(load_config(&path)?);
                }
                "--port" => {
                    // Parsed as u32 so out-of-range values report cleanly
                    // instead of failing the u16 conversion opaquely
                    let port: u32 = parse_value(&arg, args.next())?;
                    if port == 0 || port > u32::from(u16::MAX) {
                        return Err(ConfigError::InvalidPort(port));
                    }
                    overrides.push(Box::new(move |c| c.port = port as u16));
                }
                "--http" => overrides.push(Box::new(|c| c.use_https = false)),
                "--https" => overrides.push(Box::new(|c| c.use_https = true)),
                "--cert" => {
                    let path: String = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.cert_path = Some(path)));
                }
                "--response" => {
                    let body: String = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.response_body = body));
                }
                "--workers" => {
                    let workers: usize = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.workers = workers));
                }
                "--buffer-size" => {
                    let size: usize = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.buffer_size = size));
                }
                "--ulimit" => {
                    let ulimit: u64 = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.ulimit = ulimit));
                }
                "--ssh-only" => overrides.push(Box::new(|c| c.ssh_only = true)),
                "--ssh-port" => {
                    let port: u16 = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.ssh_port = port));
                }
                "--openvpn-port" => {
                    let port: u16 = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.openvpn_port = port));
                }
                "--v2ray-port" => {
                    let port: u16 = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.v2ray_port = port));
                }
                "--remote-host" => {
                    let host: String = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.remote_host = host));
                }
                "--token" => {
                    let token: String = parse_value(&arg, args.next())?;
                    overrides.push(Box::new(move |c| c.token = Some(token)));
                }
                "--validate" => overrides.push(Box::new(|c| c.validate_only = true)),
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("multiflow-proxy v{}", multiflow_proxy::VERSION);
                    std::process::exit(0);
                }
                other => {
                    return Err(ConfigError::invalid_flag(other, "unknown flag"));
                }
            }
        }

        let mut config = config.unwrap_or_default();
        for apply in overrides {
            apply(&mut config);
        }
        config.validate()?;

        Ok(Self { config })
    }
}

fn print_help() {
    println!(
        r#"multiflow-proxy v{}

Transport-layer dispatch proxy: HTTP/WebSocket decoy handshake, protocol
sniffing, and full-duplex bridging to local tunnel upstreams.

USAGE:
    multiflow-proxy [OPTIONS]

OPTIONS:
    -c, --config <PATH>      JSON configuration file (flags override it)
        --port <PORT>        Listener port [default: 8080]
        --http               Plain TCP (default)
        --https              Terminate TLS on accepted connections
        --cert <PATH>        PEM bundle with certificate chain and private key;
                             without it, --https generates a self-signed cert
        --response <STR>     Override the canned HTTP decoy response
        --workers <N>        Worker pool size [default: 4]
        --buffer-size <N>    Forwarder buffer bytes [default: 16384]
        --ulimit <N>         File-descriptor soft limit target [default: 65536]
        --ssh-only           Disable OpenVPN and V2Ray dispatch
        --ssh-port <PORT>    SSH upstream port [default: 22]
        --openvpn-port <PORT> OpenVPN upstream port [default: 1194]
        --v2ray-port <PORT>  V2Ray upstream port [default: 10086]
        --remote-host <HOST> Upstream host [default: 127.0.0.1]
        --token <STR>        Access token for the external validator tooling
        --validate           Validate the token and exit (external tooling)
    -h, --help               Print help
    -v, --version            Print version

ENVIRONMENT:
    RUST_LOG                 Log filter (overrides the configured level)
    MULTIFLOW_LOG_LEVEL      Log level when loading from a config file
"#,
        multiflow_proxy::VERSION
    );
}

/// Initialize logging
///
/// `RUST_LOG` takes precedence; the configured level is the default filter.
fn init_logging(config: &ProxyConfig) {
    let level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        // Reduce noise from dependencies
        .add_directive("rustls=warn".parse().unwrap())
        .add_directive("tokio=warn".parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: ProxyConfig) -> Result<()> {
    let server = ProxyServer::bind(config).context("initialization failed")?;
    let shutdown = server.shutdown_handle();

    // SIGINT/SIGTERM flip the stop flag; the dispatch loop exits on the next
    // iteration and in-flight bridges drain naturally
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }

        shutdown.shutdown();
    });

    server.run().await?;
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("multiflow-proxy: {e}");
            return ExitCode::from(1);
        }
    };

    init_logging(&args.config);

    if args.config.validate_only {
        // Token validation lives in the external management tooling; the
        // bridging path never consults it
        warn!("--validate requested, but token validation is delegated to external tooling");
        eprintln!("multiflow-proxy: token validation is handled by the external validator service");
        return ExitCode::from(1);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("multiflow-proxy: failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(args.config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            eprintln!("multiflow-proxy: {e:#}");
            ExitCode::from(1)
        }
    }
}
