use crate::dns::channel::UdpChannel;
use crate::error::Error;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Default number of live channels a pool will keep.
pub const POOL_MAX_SIZE: u32 = 16;

/// Bounded pool of [`UdpChannel`]s with lazy construction.
///
/// The idle queue is a bounded queue sized to the pool capacity; the live
/// count tracks every channel currently idle or handed out. `acquire`
/// prefers an idle channel, opens a new one while capacity remains, and
/// otherwise waits for a release. Poisoned channels are destroyed on
/// release, freeing their slot for a fresh connection.
#[derive(Debug)]
pub struct ChannelPool {
    idle_tx: mpsc::Sender<UdpChannel>,
    idle_rx: Mutex<mpsc::Receiver<UdpChannel>>,
    live: AtomicU32,
    capacity: u32,
    server_addr: String,
    io_timeout: Duration,
}

impl ChannelPool {
    pub fn new(server_addr: String, io_timeout: Duration) -> Self {
        Self::with_capacity(server_addr, io_timeout, POOL_MAX_SIZE)
    }

    pub fn with_capacity(server_addr: String, io_timeout: Duration, capacity: u32) -> Self {
        let (idle_tx, idle_rx) = mpsc::channel(capacity as usize);
        ChannelPool {
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
            live: AtomicU32::new(0),
            capacity,
            server_addr,
            io_timeout,
        }
    }

    /// Obtain a channel for one exchange: an idle one when available, a newly
    /// opened one while the pool has spare capacity, otherwise the next
    /// released channel.
    pub async fn acquire(&self) -> Result<UdpChannel, Error> {
        if let Ok(channel) = self.idle_rx.lock().await.try_recv() {
            return Ok(channel);
        }

        if self.live.load(Ordering::Acquire) >= self.capacity {
            return self.wait_for_idle().await;
        }

        // Reserve a slot before dialing. A racing acquirer can push the count
        // past capacity; the loser rolls its reservation back and waits.
        if self.live.fetch_add(1, Ordering::AcqRel) + 1 > self.capacity {
            self.live.fetch_sub(1, Ordering::AcqRel);
            return self.wait_for_idle().await;
        }

        // The opener can fault inside transport initialization; a panic here
        // must surface as an error value with the reservation rolled back.
        let opened = AssertUnwindSafe(UdpChannel::open(&self.server_addr, self.io_timeout))
            .catch_unwind()
            .await;
        match opened {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(err)) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                Err(err)
            }
            Err(panic) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                Err(Error::Connection(format!(
                    "error while connecting: {}",
                    panic_message(panic.as_ref())
                )))
            }
        }
    }

    /// Return a channel after an exchange. Poisoned channels are destroyed;
    /// healthy ones rejoin the idle queue unless a racing refill already
    /// filled it, in which case the channel is destroyed as well.
    pub async fn release(&self, channel: UdpChannel) {
        if channel.is_poisoned() {
            tracing::debug!("evicting poisoned DNS channel");
            self.live.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        if self.idle_tx.try_send(channel).is_err() {
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Channels currently alive, idle or handed out.
    pub fn live_count(&self) -> u32 {
        self.live.load(Ordering::Acquire)
    }

    async fn wait_for_idle(&self) -> Result<UdpChannel, Error> {
        match self.idle_rx.lock().await.recv().await {
            Some(channel) => Ok(channel),
            // The sender half lives as long as the pool, so the queue cannot
            // disconnect while callers hold a reference.
            None => Err(Error::Transport("channel pool is closed".to_string())),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

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

    /// A server that answers only every other datagram, so half of the
    /// exchanges time out and poison their channel.
    async fn flaky_server() -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let mut n_seen = 0u64;
            while let Ok((n, src)) = socket.recv_from(&mut buf).await {
                n_seen += 1;
                if n_seen % 2 == 0 {
                    let _ = socket.send_to(&buf[..n], src).await;
                }
            }
        });
        addr.to_string()
    }

    async fn drain_idle(pool: &ChannelPool) -> u32 {
        let mut rx = pool.idle_rx.lock().await;
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    #[tokio::test]
    async fn acquire_reuses_released_channel() {
        let pool = ChannelPool::with_capacity(echo_server().await, Duration::from_secs(1), 4);

        let channel = pool.acquire().await.unwrap();
        assert_eq!(pool.live_count(), 1);
        pool.release(channel).await;

        let _channel = pool.acquire().await.unwrap();
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn poisoned_channel_is_evicted() {
        // Bound but silent peer: every exchange times out.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap().to_string();
        let pool = ChannelPool::with_capacity(addr, Duration::from_millis(50), 1);

        let mut channel = pool.acquire().await.unwrap();
        channel.send_and_receive(b"ping").await.unwrap_err();
        assert!(channel.is_poisoned());
        pool.release(channel).await;

        assert_eq!(pool.live_count(), 0);
        assert_eq!(drain_idle(&pool).await, 0);

        // The freed slot admits a fresh channel.
        let channel = pool.acquire().await.unwrap();
        assert!(!channel.is_poisoned());
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn saturated_pool_blocks_until_release() {
        let pool = Arc::new(ChannelPool::with_capacity(
            echo_server().await,
            Duration::from_secs(1),
            1,
        ));

        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        // The waiter cannot make progress while the only channel is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        pool.release(held).await;
        let channel = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(pool.live_count(), 1);
        pool.release(channel).await;
    }

    #[tokio::test]
    async fn failed_open_rolls_back_reservation() {
        let pool = ChannelPool::with_capacity(
            "name.invalid.:53".to_string(),
            Duration::from_secs(1),
            2,
        );

        pool.acquire().await.unwrap_err();
        assert_eq!(pool.live_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_churn_never_leaks_channels() {
        let pool = Arc::new(ChannelPool::with_capacity(
            flaky_server().await,
            Duration::from_millis(100),
            4,
        ));

        let mut tasks = Vec::new();
        for i in 0..32u8 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                let mut channel = pool.acquire().await.unwrap();
                let _ = channel.send_and_receive(&[i]).await;
                pool.release(channel).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // After quiescence every live channel is sitting in the idle queue.
        let live = pool.live_count();
        let idle = drain_idle(&pool).await;
        assert_eq!(live, idle);
        assert!(idle <= 4);
    }
}
