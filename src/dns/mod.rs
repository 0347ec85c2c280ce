//! DNS gateway: a pooled UDP client for RFC 2136 dynamic updates and
//! queries against the authoritative server, with mutating messages
//! authenticated by RFC 2931 SIG(0) signatures.
//!
//! The gateway is the only component that talks to the network. It owns a
//! [`ChannelPool`] of connected sockets and a [`Signer`] loaded from the
//! configured key pair; both are immutable after construction and shared by
//! every HTTP request handler.

pub mod channel;
pub mod gateway;
pub mod pool;
pub mod signer;

pub use channel::UdpChannel;
pub use gateway::DnsGateway;
pub use pool::ChannelPool;
pub use signer::Signer;

use crate::error::Error;
use async_trait::async_trait;
use std::sync::Arc;
use trust_dns_client::rr::{Name, Record, RecordType};

/// The operations the directory needs from the DNS control connection.
///
/// The production implementation is [`DnsGateway`]; the service mapper is
/// written against this trait so its record semantics can be exercised with
/// an in-memory gate.
#[async_trait]
pub trait DnsGate {
    /// Insert `rrs` into `zone` with a signed dynamic update.
    async fn add(&self, zone: &Name, rrs: Vec<Record>) -> Result<(), Error>;

    /// Remove records from `zone` with a signed dynamic update: each entry
    /// in `rrs` by exact rdata match, plus every record at `name` when one
    /// is given.
    async fn remove(
        &self,
        zone: &Name,
        name: Option<&Name>,
        rrs: Vec<Record>,
    ) -> Result<(), Error>;

    /// Look up `rtype` records at `name` and return the answer section.
    /// NXDOMAIN is an empty answer, not an error.
    async fn query(&self, rtype: RecordType, name: &Name) -> Result<Vec<Record>, Error>;
}

/// A shareable gate handle.
pub type DynDnsGate = Arc<dyn DnsGate + Send + Sync>;
