use crate::directory::names;
use crate::dns::DynDnsGate;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use trust_dns_client::rr::rdata::{SRV, TXT};
use trust_dns_client::rr::{Name, RData, Record, RecordType};

/// One service instance, as carried over the JSON API and mirrored into DNS.
///
/// The wire representation of an instance is the record triple built by
/// [`Directory::reg_dns_srv`]: a PTR from the service type to the instance
/// name, an SRV carrying target/port/priority/weight, and a TXT holding the
/// `key=value` parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DnsService {
    pub name: String,
    pub server: String,
    pub port: u16,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub priority: u16,
    #[serde(default)]
    pub weight: u16,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Append the root dot to a name when it is missing.
pub fn canonicalize(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Maps service instances onto PTR/SRV/TXT record triples and drives the
/// DNS gate with them.
///
/// The zone is fixed at construction. Every type, name, and server passing
/// through is canonicalized to FQDN form and required to sit inside the
/// zone; the naming grammar is applied to the portion in front of the zone.
pub struct Directory {
    gate: DynDnsGate,
    zone: Name,
    zone_fqdn: String,
    zone_suffix: String,
}

impl Directory {
    pub fn new(gate: DynDnsGate, domain: &str) -> Result<Self, Error> {
        let zone_fqdn = canonicalize(domain);
        let zone = Name::from_str(&zone_fqdn)
            .map_err(|err| Error::BadRequest(format!("bad zone '{zone_fqdn}': {err}")))?;
        Ok(Directory {
            gate,
            zone,
            zone_suffix: format!(".{zone_fqdn}"),
            zone_fqdn,
        })
    }

    /// The zone FQDN this directory manages, with its trailing dot.
    pub fn zone_fqdn(&self) -> &str {
        &self.zone_fqdn
    }

    /// Register one service instance: validate, build the record triple, and
    /// send a single signed update inserting all three records.
    pub async fn reg_dns_srv(&self, service_type: &str, svc: &DnsService) -> Result<(), Error> {
        if svc.port == 0 {
            return Err(Error::WrongPort("service port must be non-zero".to_string()));
        }
        let type_fqdn = self.checked_type(service_type)?;
        let name_fqdn = self.checked_name(&svc.name)?;
        let server_fqdn = self.checked_server(&svc.server)?;
        checked_prefix(&name_fqdn, &type_fqdn)?;

        let mut params = svc.params.clone();
        params.insert("txtvers".to_string(), "1".to_string());
        let txt_strings = names::encode_txt_params(&params)?;

        let type_name = parse_name(&type_fqdn, Error::WrongSrvType)?;
        let instance = parse_name(&name_fqdn, Error::WrongSrvName)?;
        let server = parse_name(&server_fqdn, Error::WrongServer)?;

        let ptr = Record::from_rdata(type_name, 0, RData::PTR(instance.clone()));
        let srv = Record::from_rdata(
            instance.clone(),
            svc.ttl,
            RData::SRV(SRV::new(svc.priority, svc.weight, svc.port, server)),
        );
        let txt = Record::from_rdata(instance, 0, RData::TXT(TXT::new(txt_strings)));

        self.gate.add(&self.zone, vec![ptr, srv, txt]).await
    }

    /// Unregister an instance from its service type: one update deleting the
    /// PTR by rdata and every record at the instance name.
    pub async fn rm_dns_srv(&self, service_type: &str, name: &str) -> Result<(), Error> {
        let type_fqdn = self.checked_type(service_type)?;
        let name_fqdn = self.checked_name(name)?;
        checked_prefix(&name_fqdn, &type_fqdn)?;

        let type_name = parse_name(&type_fqdn, Error::WrongSrvType)?;
        let instance = parse_name(&name_fqdn, Error::WrongSrvName)?;
        let ptr = Record::from_rdata(type_name, 0, RData::PTR(instance.clone()));

        self.gate
            .remove(&self.zone, Some(&instance), vec![ptr])
            .await
    }

    /// Remove one `(name, server, port)` instance by deleting exactly its
    /// SRV record. Other records at the name stay untouched.
    pub async fn rm_instance(&self, name: &str, server: &str, port: u16) -> Result<(), Error> {
        if port == 0 {
            return Err(Error::WrongPort("service port must be non-zero".to_string()));
        }
        let name_fqdn = self.checked_name(name)?;
        let server_fqdn = self.checked_server(server)?;

        let instance = parse_name(&name_fqdn, Error::WrongSrvName)?;
        let server = parse_name(&server_fqdn, Error::WrongServer)?;
        let srv = Record::from_rdata(instance, 0, RData::SRV(SRV::new(0, 0, port, server)));

        self.gate.remove(&self.zone, None, vec![srv]).await
    }

    /// Names of the instances registered under a service type, in DNS answer
    /// order.
    pub async fn find_dns_srv_names(&self, service_type: &str) -> Result<Vec<String>, Error> {
        let type_fqdn = self.checked_type(service_type)?;
        let type_name = parse_name(&type_fqdn, Error::WrongSrvType)?;

        let answers = self.gate.query(RecordType::PTR, &type_name).await?;
        Ok(answers
            .iter()
            .filter_map(|rr| match rr.data() {
                Some(RData::PTR(target)) => Some(target.to_string()),
                _ => None,
            })
            .collect())
    }

    /// Resolve a service name into its instances: one [`DnsService`] per SRV
    /// answer, all sharing the parameter map parsed from the TXT record.
    pub async fn find_dns_srv_instances(&self, name: &str) -> Result<Vec<DnsService>, Error> {
        let name_fqdn = self.checked_name(name)?;
        let instance = parse_name(&name_fqdn, Error::WrongSrvName)?;

        let answers = self.gate.query(RecordType::ANY, &instance).await?;

        let mut srvs = Vec::new();
        let mut txt: Option<TXT> = None;
        for rr in &answers {
            match rr.data() {
                Some(RData::SRV(srv)) => srvs.push((rr.ttl(), srv.clone())),
                Some(RData::TXT(data)) if txt.is_none() => txt = Some(data.clone()),
                _ => {}
            }
        }
        if srvs.is_empty() {
            return Err(Error::SrvNotFound(format!(
                "SRV records not found for service '{name_fqdn}'"
            )));
        }

        let params = txt.map(parse_txt_params).unwrap_or_default();
        Ok(srvs
            .into_iter()
            .map(|(ttl, srv)| DnsService {
                name: name_fqdn.clone(),
                server: srv.target().to_string(),
                port: srv.port(),
                ttl,
                priority: srv.priority(),
                weight: srv.weight(),
                params: params.clone(),
            })
            .collect())
    }

    fn checked_type(&self, service_type: &str) -> Result<String, Error> {
        let fqdn = canonicalize(service_type);
        let in_zone = fqdn
            .strip_suffix(&self.zone_suffix)
            .ok_or_else(|| {
                Error::WrongSrvType(format!(
                    "service type '{fqdn}' is outside zone '{}'",
                    self.zone_fqdn
                ))
            })?;
        names::validate_service_type(in_zone)?;
        Ok(fqdn)
    }

    fn checked_name(&self, name: &str) -> Result<String, Error> {
        let fqdn = canonicalize(name);
        let in_zone = fqdn
            .strip_suffix(&self.zone_suffix)
            .ok_or_else(|| {
                Error::WrongSrvName(format!(
                    "service name '{fqdn}' is outside zone '{}'",
                    self.zone_fqdn
                ))
            })?;
        names::validate_service_name(in_zone)?;
        Ok(fqdn)
    }

    fn checked_server(&self, server: &str) -> Result<String, Error> {
        let fqdn = canonicalize(server);
        if !fqdn.ends_with(&self.zone_suffix) {
            return Err(Error::WrongServer(format!(
                "server '{fqdn}' is outside zone '{}'",
                self.zone_fqdn
            )));
        }
        Ok(fqdn)
    }
}

/// A full instance name must extend its service type by a plain prefix.
fn checked_prefix(name_fqdn: &str, type_fqdn: &str) -> Result<(), Error> {
    let prefix = name_fqdn
        .strip_suffix(type_fqdn)
        .and_then(|prefix| prefix.strip_suffix('.'))
        .ok_or_else(|| {
            Error::WrongSrvName("service name must end with its service type".to_string())
        })?;
    names::validate_name_prefix(prefix)
}

/// TXT strings are `key=value` pairs; a string without `=` is a key with an
/// empty value, and the first occurrence of a key wins.
fn parse_txt_params(txt: TXT) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for data in txt.txt_data() {
        let string = String::from_utf8_lossy(data).to_string();
        let (key, value) = string.split_once('=').unwrap_or((string.as_str(), ""));
        params
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
    params
}

fn parse_name(fqdn: &str, wrap: fn(String) -> Error) -> Result<Name, Error> {
    Name::from_str(fqdn).map_err(|err| wrap(format!("'{fqdn}': {err}")))
}
