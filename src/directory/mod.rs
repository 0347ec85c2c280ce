//! The service directory core: the naming grammar, the mapping between
//! service instances and their PTR/SRV/TXT record triples, and the
//! self-registration lifecycle.
//!
//! Instances live under DNS-SD style service types (every type label starts
//! with `_`, e.g. `_http._tcp.example.com.`) inside the single zone the
//! directory is configured for. The authoritative DNS server is the system
//! of record; nothing is cached or persisted here.

pub mod names;
pub mod registrar;
pub mod service;

pub use registrar::Registrar;
pub use service::{Directory, DnsService};
