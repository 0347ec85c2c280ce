//! Director
//!
//! A service directory exposing a small HTTP/JSON control plane over a
//! signed dynamic-DNS data plane. Operators and clients register, discover,
//! and remove service instances as DNS resource records (PTR + SRV + TXT)
//! in a zone managed by an authoritative server that accepts [RFC 2136]
//! dynamic updates authenticated with [RFC 2931] SIG(0) signatures.
//!
//! The directory also registers its own HTTP endpoints into DNS at startup
//! (under `_drt._rest_http.<domain>.`) and removes them again at shutdown,
//! so the control plane is discoverable through the records it manages.
//!
//! There is no local state: the authoritative DNS server is the system of
//! record, and every API call maps onto exactly one DNS exchange.
//!
//! [RFC 2136]: https://www.rfc-editor.org/rfc/rfc2136
//! [RFC 2931]: https://www.rfc-editor.org/rfc/rfc2931
#![warn(clippy::pedantic)]

pub mod api;
pub mod config;
pub mod directory;
pub mod dns;
pub mod error;

pub use config::{Config, SharedConfig};
pub use directory::{Directory, DnsService, Registrar};
pub use dns::DnsGateway;
pub use error::Error;
