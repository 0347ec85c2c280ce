use crate::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

/// Runtime configuration, assembled from the command line in `main`.
///
/// Each option feeds exactly one component: `addr`/`port` bind the HTTP
/// server, `hostname` and the `srv_*` fields shape the self-registered
/// service instances, `dns_addr`/`dns_keypath` configure the DNS gateway,
/// and `root`/`domain` scope the API paths and the DNS zone.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: IpAddr,
    pub port: u16,
    pub hostname: String,
    pub root: String,
    pub domain: String,
    pub dns_addr: String,
    pub dns_keypath: PathBuf,
    pub srv_ttl: u32,
    pub srv_priority: u16,
    pub srv_weight: u16,
    pub api_timeout: Duration,
}

impl Config {
    pub fn api_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// Resolve a `host[:port]` DNS server argument into a dialable `host:port`
/// address, defaulting the port to 53.
pub fn parse_dns_server(server: &str) -> Result<String, Error> {
    match server.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::WrongPort(format!("wrong DNS port specified '{port}'")))?;
            Ok(format!("{host}:{port}"))
        }
        None => Ok(format!("{server}:53")),
    }
}

/// API roots are absolute paths; accept a bare segment and prefix the slash.
pub fn normalize_root(root: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.starts_with('/') {
        root.to_string()
    } else {
        format!("/{root}")
    }
}
