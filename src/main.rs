use anyhow::Result;
use clap::Parser;
use director::config::{normalize_root, parse_dns_server, Config, SharedConfig};
use std::ffi::OsStr;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// DNS-backed service directory: registers, discovers and removes service
/// instances as signed dynamic-DNS records.
#[derive(Parser, Debug)]
#[command(name = "director", version, disable_help_flag = true)]
struct Args {
    /// Address the HTTP API binds to
    #[arg(short = 'a', long = "addr", default_value = "0.0.0.0")]
    addr: IpAddr,

    /// Port the HTTP API listens on
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    port: u16,

    /// Hostname advertised in the self-registered SRV records
    /// (default: the OS hostname)
    #[arg(short = 'h', long = "hostname")]
    hostname: Option<String>,

    /// Root path of the HTTP API
    #[arg(short = 'r', long = "root", default_value = "/director")]
    root: String,

    /// Domain of the managed DNS zone
    #[arg(short = 'd', long = "domain")]
    domain: String,

    /// Authoritative DNS server, as host[:port]
    #[arg(long = "dns-s")]
    dns_server: String,

    /// Path to the SIG(0) private key (BIND format, ends in .private)
    #[arg(long = "dns-pk", default_value = "./dns.private")]
    dns_keypath: PathBuf,

    /// TTL of the self-registered SRV records
    #[arg(long = "srv-ttl", default_value_t = 120)]
    srv_ttl: u32,

    /// Priority of the self-registered SRV records
    #[arg(long = "srv-priority", default_value_t = 0)]
    srv_priority: u16,

    /// Weight of the self-registered SRV records
    #[arg(long = "srv-weight", default_value_t = 0)]
    srv_weight: u16,

    /// Write logs to this file instead of stdout
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "info")]
    log_level: tracing::Level,

    /// Print help
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    let _log_guard = tracing_init(&args);

    let config = config_from_args(args).unwrap_or_else(|err| {
        eprintln!("{err}");
        std::process::exit(127);
    });

    tracing::info!("director server starting");
    director::api::run(config).await
}

/// Unknown flags and missing mandatory arguments exit with status 127.
fn parse_args() -> Args {
    Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        let code = match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
            _ => 127,
        };
        std::process::exit(code);
    })
}

fn config_from_args(args: Args) -> Result<SharedConfig> {
    let hostname = match args.hostname {
        Some(hostname) => hostname,
        None => hostname::get()?.to_string_lossy().to_string(),
    };
    let dns_addr = parse_dns_server(&args.dns_server)?;

    Ok(Arc::new(Config {
        addr: args.addr,
        port: args.port,
        hostname,
        root: normalize_root(&args.root),
        domain: args.domain,
        dns_addr,
        dns_keypath: args.dns_keypath,
        srv_ttl: args.srv_ttl,
        srv_priority: args.srv_priority,
        srv_weight: args.srv_weight,
        api_timeout: Duration::from_secs(60),
    }))
}

fn tracing_init(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("director={}", args.log_level)));

    match &args.log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let file = path.file_name().unwrap_or_else(|| OsStr::new("director.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer())
                .with(filter)
                .init();
            None
        }
    }
}
