//! Error types.

use axum::extract::rejection::JsonRejection;

/// Error enumerates the failure states of the directory: DNS transport,
/// message protocol, signing-key handling, and service-naming validation.
///
/// Every variant maps to a stable string code via [`Error::code`]. The codes
/// are part of the HTTP API contract — error responses carry
/// `{"code": ..., "msg": ...}` — and the same codes appear in the logs, so
/// operators can correlate the two.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Dialing the DNS server failed outright.
    #[error("failed to connect to DNS server: {0}")]
    Connection(String),

    /// Dialing the DNS server exceeded the connect timeout.
    #[error("timed out connecting to DNS server: {0}")]
    ConnectionTimeout(String),

    /// A request datagram could not be written before the write deadline.
    #[error("timed out sending DNS message: {0}")]
    WriteTimeout(String),

    /// No response datagram arrived before the read deadline.
    #[error("timed out waiting for DNS response: {0}")]
    ReadTimeout(String),

    /// A transport fault that is neither a connect nor a deadline failure.
    #[error("DNS transport error: {0}")]
    Transport(String),

    /// An outgoing DNS message could not be packed to wire format.
    #[error("failed to encode DNS message: {0}")]
    BadMessage(String),

    /// A response datagram could not be parsed as a DNS message.
    #[error("bad DNS response message: {0}")]
    BadResponse(String),

    /// The DNS server answered an UPDATE with a non-success rcode.
    #[error("DNS update failed: {0}")]
    UpdateFailed(String),

    /// The DNS server answered a QUERY with a non-success rcode.
    #[error("DNS query failed: {0}")]
    QueryFailed(String),

    /// The signing key pair could not be located or parsed. The private key
    /// path must end in `.private` and have a readable `.key` sibling.
    #[error("wrong DNS key path: {0}")]
    WrongKeyPath(String),

    /// Computing the SIG(0) signature over an outgoing message failed.
    #[error("DNS message signing failed: {0}")]
    Signing(String),

    /// A port value is zero or not a 16-bit number.
    #[error("wrong port: {0}")]
    WrongPort(String),

    /// A service name fails the naming grammar or the zone suffix check.
    #[error("wrong service name: {0}")]
    WrongSrvName(String),

    /// A service type fails the naming grammar or the zone suffix check.
    #[error("wrong service type: {0}")]
    WrongSrvType(String),

    /// A target server name fails the zone suffix check.
    #[error("wrong server: {0}")]
    WrongServer(String),

    /// A TXT key or value violates the DNS-SD key and sizing rules.
    #[error("wrong TXT string: {0}")]
    WrongTxtString(String),

    /// An instance lookup returned no SRV records.
    #[error("service not found: {0}")]
    SrvNotFound(String),

    /// A request is missing a mandatory parameter.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Returned when clients send a missing, non-JSON, or unreadable body to
    /// the registration endpoint.
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),
}

impl Error {
    /// The stable string code carried in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Connection(_) => "dns_connection_error",
            Error::ConnectionTimeout(_) => "dns_connection_timeout",
            Error::WriteTimeout(_) => "dns_write_timeout",
            Error::ReadTimeout(_) => "dns_read_timeout",
            Error::Transport(_) => "dns_internal_error",
            Error::BadMessage(_) => "dns_bad_message",
            Error::BadResponse(_) => "dns_bad_response_message",
            Error::UpdateFailed(_) => "dns_update_failed",
            Error::QueryFailed(_) => "dns_query_failed",
            Error::WrongKeyPath(_) => "dns_wrong_key_path",
            Error::Signing(_) => "dns_signing_error",
            Error::WrongPort(_) => "director_wrong_port",
            Error::WrongSrvName(_) => "director_wrong_srv_name",
            Error::WrongSrvType(_) => "director_wrong_srv_type",
            Error::WrongServer(_) => "director_wrong_server",
            Error::WrongTxtString(_) => "director_wrong_txt_string",
            Error::SrvNotFound(_) => "director_srv_not_found",
            Error::BadRequest(_) => "bad_request",
            Error::JsonExtractorRejection(rejection) => match rejection {
                JsonRejection::MissingJsonContentType(_) => "unsupported_media_type",
                _ => "bad_request",
            },
        }
    }
}
