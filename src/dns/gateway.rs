use crate::dns::pool::ChannelPool;
use crate::dns::signer::Signer;
use crate::dns::DnsGate;
use crate::error::Error;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use trust_dns_client::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_client::rr::{DNSClass, Name, Record, RecordType};

/// Write and read deadline for one exchange with the DNS server.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// The pooled DNS client behind the directory.
///
/// `add` and `remove` build RFC 2136 UPDATE messages, sign them, and expect
/// a success rcode back; `query` sends plain unsigned questions. Every call
/// performs exactly one request/response exchange over exactly one pooled
/// channel, released on every exit path.
#[derive(Debug)]
pub struct DnsGateway {
    pool: ChannelPool,
    signer: Signer,
}

impl DnsGateway {
    /// Build a gateway against `server_addr` (a `host:port` pair), signing
    /// mutating messages with the key pair at `keypath`.
    pub fn open(server_addr: &str, keypath: &Path) -> Result<Self, Error> {
        let signer = Signer::from_key_path(keypath)?;
        let pool = ChannelPool::new(server_addr.to_string(), IO_TIMEOUT);
        Ok(DnsGateway { pool, signer })
    }

    /// Assemble a gateway from parts. Tests use this to shrink timeouts and
    /// pool sizes.
    pub fn with_pool(pool: ChannelPool, signer: Signer) -> Self {
        DnsGateway { pool, signer }
    }

    fn update_message(zone: &Name) -> Message {
        let mut message = Message::new();
        message
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update)
            .set_recursion_desired(false);
        let mut zone_query = Query::new();
        zone_query
            .set_name(zone.clone())
            .set_query_type(RecordType::SOA)
            .set_query_class(DNSClass::IN);
        message.add_query(zone_query);
        message
    }

    async fn exchange(&self, wire: &[u8]) -> Result<Vec<u8>, Error> {
        let mut channel = self.pool.acquire().await.map_err(|err| {
            tracing::error!("getting connection error: {err}");
            err
        })?;
        let reply = channel.send_and_receive(wire).await;
        self.pool.release(channel).await;
        reply.map_err(|err| {
            tracing::error!("sending message to DNS server error: {err}");
            err
        })
    }

    async fn send_update(&self, message: Message) -> Result<(), Error> {
        let id = message.id();
        let wire = self.signer.sign(message).map_err(|err| {
            tracing::error!("signing error: {err}");
            err
        })?;

        let reply = self.exchange(&wire).await?;
        let response = Message::from_vec(&reply).map_err(|err| {
            tracing::error!("unpacking DNS response message error: {err}");
            Error::BadResponse(format!("message {id}: {err}"))
        })?;
        if response.response_code() != ResponseCode::NoError {
            tracing::error!("DNS update failed: rcode {:?}", response.response_code());
            return Err(Error::UpdateFailed(format!(
                "message {id}: rcode {:?}",
                response.response_code()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsGate for DnsGateway {
    async fn add(&self, zone: &Name, rrs: Vec<Record>) -> Result<(), Error> {
        let mut message = Self::update_message(zone);
        for mut rr in rrs {
            rr.set_dns_class(DNSClass::IN);
            message.add_name_server(rr);
        }
        self.send_update(message).await
    }

    async fn remove(
        &self,
        zone: &Name,
        name: Option<&Name>,
        rrs: Vec<Record>,
    ) -> Result<(), Error> {
        let mut message = Self::update_message(zone);
        for mut rr in rrs {
            // Delete by exact rdata match, RFC 2136 §2.5.4.
            rr.set_dns_class(DNSClass::NONE);
            rr.set_ttl(0);
            message.add_name_server(rr);
        }
        if let Some(name) = name {
            // Delete every rrset at the name, RFC 2136 §2.5.3.
            let mut all = Record::with(name.clone(), RecordType::ANY, 0);
            all.set_dns_class(DNSClass::ANY);
            message.add_name_server(all);
        }
        self.send_update(message).await
    }

    async fn query(&self, rtype: RecordType, name: &Name) -> Result<Vec<Record>, Error> {
        let mut message = Message::new();
        message
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        message.add_query(Query::query(name.clone(), rtype));

        let id = message.id();
        let wire = message
            .to_vec()
            .map_err(|err| Error::BadMessage(format!("message {id}: {err}")))?;
        let reply = self.exchange(&wire).await?;
        let response = Message::from_vec(&reply)
            .map_err(|err| Error::BadResponse(format!("message {id}: {err}")))?;

        match response.response_code() {
            ResponseCode::NoError => Ok(response.answers().to_vec()),
            ResponseCode::NXDomain => Ok(Vec::new()),
            rcode => {
                tracing::debug!("rcode: {rcode:?}");
                Err(Error::QueryFailed(format!("message {id}: rcode {rcode:?}")))
            }
        }
    }
}
