use crate::config::Config;
use crate::directory::service::{canonicalize, Directory, DnsService};
use crate::error::Error;
use std::collections::HashMap;
use std::sync::Arc;

/// One of the directory's own HTTP endpoints, described for self-registration.
struct Endpoint {
    name: &'static str,
    method: &'static str,
    path: &'static str,
}

const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        name: "reg_srv",
        method: "PUT",
        path: "",
    },
    Endpoint {
        name: "get_srvs",
        method: "GET",
        path: "/types",
    },
    Endpoint {
        name: "get_ins",
        method: "GET",
        path: "/instances",
    },
    Endpoint {
        name: "del_srv",
        method: "DELETE",
        path: "/types",
    },
    Endpoint {
        name: "del_ins",
        method: "DELETE",
        path: "/instances",
    },
];

/// Publishes the directory's own endpoints under
/// `_drt._rest_http.<domain>.` at startup and removes those instances again
/// at shutdown, so clients can discover the control plane through the same
/// records it manages.
pub struct Registrar {
    directory: Arc<Directory>,
    service_type: String,
    base_path: String,
    server: String,
    port: u16,
    ttl: u32,
    priority: u16,
    weight: u16,
}

impl Registrar {
    pub fn new(directory: Arc<Directory>, config: &Config) -> Self {
        let service_type = format!("_drt._rest_http.{}", canonicalize(&config.domain));
        let server = advertised_server(&config.hostname, directory.zone_fqdn());
        Registrar {
            directory,
            service_type,
            base_path: format!("{}/services", config.root),
            server,
            port: config.port,
            ttl: config.srv_ttl,
            priority: config.srv_priority,
            weight: config.srv_weight,
        }
    }

    /// Register every directory endpoint. Any failure aborts startup; the
    /// caller must not begin serving on error.
    pub async fn register_all(&self) -> Result<(), Error> {
        for endpoint in ENDPOINTS {
            self.directory
                .reg_dns_srv(&self.service_type, &self.endpoint_service(endpoint))
                .await?;
        }
        Ok(())
    }

    /// Best-effort teardown: failures are logged and skipped so shutdown
    /// always completes.
    pub async fn deregister_all(&self) {
        for endpoint in ENDPOINTS {
            let name = format!("{}.{}", endpoint.name, self.service_type);
            if let Err(err) = self
                .directory
                .rm_instance(&name, &self.server, self.port)
                .await
            {
                tracing::error!("failed to delete directory instance '{name}': {err}");
            }
        }
    }

    fn endpoint_service(&self, endpoint: &Endpoint) -> DnsService {
        DnsService {
            name: format!("{}.{}", endpoint.name, self.service_type),
            server: self.server.clone(),
            port: self.port,
            ttl: self.ttl,
            priority: self.priority,
            weight: self.weight,
            params: HashMap::from([
                (
                    "path".to_string(),
                    format!("{}{}", self.base_path, endpoint.path),
                ),
                ("method".to_string(), endpoint.method.to_string()),
            ]),
        }
    }
}

/// The advertised host must be a zone-resident FQDN; a bare OS hostname gets
/// the zone appended.
fn advertised_server(hostname: &str, zone_fqdn: &str) -> String {
    let fqdn = canonicalize(hostname);
    if fqdn.ends_with(&format!(".{zone_fqdn}")) {
        fqdn
    } else {
        format!("{}.{zone_fqdn}", fqdn.trim_end_matches('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::service::tests::MockGate;
    use crate::dns::DnsGate;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::PathBuf;
    use std::str::FromStr;
    use std::time::Duration;
    use trust_dns_client::rr::{Name, RData, Record, RecordType};

    fn config() -> Config {
        Config {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            hostname: "director-host".to_string(),
            root: "/director".to_string(),
            domain: "example.com".to_string(),
            dns_addr: "127.0.0.1:53".to_string(),
            dns_keypath: PathBuf::from("./dns.private"),
            srv_ttl: 120,
            srv_priority: 0,
            srv_weight: 0,
            api_timeout: Duration::from_secs(60),
        }
    }

    fn registrar() -> (std::sync::Arc<MockGate>, Registrar) {
        let gate = std::sync::Arc::new(MockGate::default());
        let directory = Arc::new(Directory::new(gate.clone(), "example.com").unwrap());
        (gate, Registrar::new(directory, &config()))
    }

    #[tokio::test]
    async fn registers_every_endpoint() {
        let (gate, registrar) = registrar();
        registrar.register_all().await.unwrap();

        let added = gate.added.lock().unwrap();
        assert_eq!(added.len(), 5);

        // Every endpoint hangs off the directory's own service type and
        // advertises its route and method in the TXT params.
        let (_, rrs) = &added[0];
        assert_eq!(
            rrs[0].name(),
            &Name::from_str("_drt._rest_http.example.com.").unwrap()
        );
        let Some(RData::PTR(target)) = rrs[0].data() else {
            panic!("first record is not a PTR")
        };
        assert_eq!(
            target,
            &Name::from_str("reg_srv._drt._rest_http.example.com.").unwrap()
        );

        let Some(RData::TXT(txt)) = rrs[2].data() else {
            panic!("third record is not a TXT")
        };
        let strings: Vec<String> = txt
            .txt_data()
            .iter()
            .map(|s| String::from_utf8_lossy(s).to_string())
            .collect();
        assert!(strings.contains(&"path=/director/services".to_string()));
        assert!(strings.contains(&"method=PUT".to_string()));
    }

    #[tokio::test]
    async fn bare_hostname_is_qualified_into_the_zone() {
        let (gate, registrar) = registrar();
        registrar.register_all().await.unwrap();

        let added = gate.added.lock().unwrap();
        let Some(RData::SRV(srv)) = added[0].1[1].data() else {
            panic!("second record is not an SRV")
        };
        assert_eq!(
            srv.target(),
            &Name::from_str("director-host.example.com.").unwrap()
        );
        assert_eq!(srv.port(), 8080);
    }

    #[tokio::test]
    async fn deregisters_every_instance_without_name_wide_deletes() {
        let (gate, registrar) = registrar();
        registrar.deregister_all().await;

        let removed = gate.removed.lock().unwrap();
        assert_eq!(removed.len(), 5);
        for (_, name, rrs) in removed.iter() {
            assert!(name.is_none());
            assert_eq!(rrs.len(), 1);
            assert_eq!(rrs[0].record_type(), RecordType::SRV);
        }
    }

    /// A gate whose updates always fail.
    struct RefusingGate;

    #[async_trait]
    impl DnsGate for RefusingGate {
        async fn add(&self, _: &Name, _: Vec<Record>) -> Result<(), Error> {
            Err(Error::UpdateFailed("rcode Refused".to_string()))
        }

        async fn remove(&self, _: &Name, _: Option<&Name>, _: Vec<Record>) -> Result<(), Error> {
            Err(Error::UpdateFailed("rcode Refused".to_string()))
        }

        async fn query(&self, _: RecordType, _: &Name) -> Result<Vec<Record>, Error> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn registration_failure_propagates() {
        let directory = Arc::new(
            Directory::new(std::sync::Arc::new(RefusingGate), "example.com").unwrap(),
        );
        let registrar = Registrar::new(directory, &config());

        let err = registrar.register_all().await.unwrap_err();
        assert_eq!(err.code(), "dns_update_failed");
    }

    #[tokio::test]
    async fn deregistration_failures_are_swallowed() {
        let directory = Arc::new(
            Directory::new(std::sync::Arc::new(RefusingGate), "example.com").unwrap(),
        );
        let registrar = Registrar::new(directory, &config());

        // Must not panic or abort early.
        registrar.deregister_all().await;
    }
}
