use crate::error::Error;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Response datagrams can exceed the classic 512-byte limit when the server
/// answers with EDNS payloads; 4096 covers what an authoritative server
/// sends us.
const RECV_BUFFER_SIZE: usize = 4096;

const DIAL_ATTEMPTS: u32 = 3;
const DIAL_BACKOFF: Duration = Duration::from_millis(10);

/// One connected UDP socket to the DNS server with per-operation deadlines.
///
/// A channel is exclusively owned by its acquirer for the duration of one
/// request/response exchange. Any transport fault sets the poison bit, after
/// which the pool destroys the channel instead of recycling it.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
    timeout: Duration,
    poisoned: bool,
}

impl UdpChannel {
    /// Dial `addr` (a `host:port` pair) and return a connected channel whose
    /// write and read deadlines are each `io_timeout` wide. Transient dial
    /// faults are retried up to three attempts with a short backoff.
    pub async fn open(addr: &str, io_timeout: Duration) -> Result<Self, Error> {
        let mut attempt = 1;
        loop {
            match timeout(io_timeout, Self::dial(addr)).await {
                Err(_) => {
                    return Err(Error::ConnectionTimeout(format!("dialing '{addr}'")));
                }
                Ok(Ok(socket)) => {
                    return Ok(UdpChannel {
                        socket,
                        timeout: io_timeout,
                        poisoned: false,
                    });
                }
                Ok(Err(err)) => {
                    tracing::error!(
                        "attempt #{attempt} to connect to '{addr}' DNS server failed: {err}"
                    );
                    match err.kind() {
                        ErrorKind::TimedOut => {
                            return Err(Error::ConnectionTimeout(err.to_string()));
                        }
                        ErrorKind::Interrupted | ErrorKind::WouldBlock
                            if attempt < DIAL_ATTEMPTS =>
                        {
                            tracing::info!("transient dial error, trying again");
                            sleep(DIAL_BACKOFF).await;
                            attempt += 1;
                        }
                        _ => return Err(Error::Connection(err.to_string())),
                    }
                }
            }
        }
    }

    async fn dial(addr: &str) -> std::io::Result<UdpSocket> {
        let target = tokio::net::lookup_host(addr).await?.next().ok_or_else(|| {
            std::io::Error::new(
                ErrorKind::NotFound,
                format!("no addresses resolved for '{addr}'"),
            )
        })?;
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;
        Ok(socket)
    }

    /// Send one datagram and wait for one response datagram. The deadline is
    /// recomputed separately for the write and for the read. Any failure
    /// poisons the channel.
    pub async fn send_and_receive(&mut self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        if let Err(err) = self.write(msg).await {
            self.poisoned = true;
            return Err(err);
        }
        match self.read().await {
            Ok(datagram) => Ok(datagram),
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    /// A poisoned channel must not be returned to the pool.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    async fn write(&self, msg: &[u8]) -> Result<(), Error> {
        match timeout(self.timeout, self.socket.send(msg)).await {
            Err(_) => Err(Error::WriteTimeout(format!(
                "no write progress within {:?}",
                self.timeout
            ))),
            Ok(Err(err)) => Err(Error::Transport(err.to_string())),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn read(&self) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        match timeout(self.timeout, self.socket.recv(&mut buf)).await {
            Err(_) => Err(Error::ReadTimeout(format!(
                "no response within {:?}",
                self.timeout
            ))),
            Ok(Err(err)) => Err(Error::Transport(err.to_string())),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_server() -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            while let Ok((n, src)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..n], src).await;
            }
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn exchange_round_trips_datagram() {
        let addr = echo_server().await;
        let mut channel = UdpChannel::open(&addr, Duration::from_secs(1)).await.unwrap();

        let reply = channel.send_and_receive(b"ping").await.unwrap();
        assert_eq!(reply, b"ping");
        assert!(!channel.is_poisoned());
    }

    #[tokio::test]
    async fn read_timeout_poisons_channel() {
        // A bound but silent peer: the write succeeds, the read deadline fires.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap().to_string();

        let mut channel = UdpChannel::open(&addr, Duration::from_millis(50)).await.unwrap();
        let err = channel.send_and_receive(b"ping").await.unwrap_err();

        assert_eq!(err.code(), "dns_read_timeout");
        assert!(channel.is_poisoned());
    }

    #[tokio::test]
    async fn unresolvable_server_is_a_connection_error() {
        let err = UdpChannel::open("name.invalid.:53", Duration::from_secs(1))
            .await
            .unwrap_err();
        // Resolver behaviour differs between hosts: a fast NXDOMAIN surfaces
        // as a connection error, a stalled resolver as a connect timeout.
        assert!(matches!(
            err.code(),
            "dns_connection_error" | "dns_connection_timeout"
        ));
    }
}
