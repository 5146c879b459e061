use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{error::RelayError, stats::StatsTable};

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// How long a receive blocks before the loop re-checks the exit flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
pub struct ForwardMetrics {
    pub received: AtomicU64,
    pub forwarded: AtomicU64,
    pub unmeasured: AtomicU64,
    pub receive_errors: AtomicU64,
    pub send_errors: AtomicU64,
}

impl ForwardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) {
        debug!(
            "Received {} datagrams, forwarded {}, unmeasured {}, receive errors {}, send errors {}",
            self.received.load(Ordering::Relaxed),
            self.forwarded.load(Ordering::Relaxed),
            self.unmeasured.load(Ordering::Relaxed),
            self.receive_errors.load(Ordering::Relaxed),
            self.send_errors.load(Ordering::Relaxed),
        );
    }
}

/// Receives datagrams on the listen socket and sends each payload, unchanged,
/// to the forward address from the same socket.
pub struct UdpForwarder {
    socket: UdpSocket,
    forward_addr: SocketAddr,
    stats: Arc<StatsTable>,
    metrics: Arc<ForwardMetrics>,
}

impl UdpForwarder {
    pub fn bind(
        listen_addr: SocketAddr,
        forward_addr: SocketAddr,
        stats: Arc<StatsTable>,
        metrics: Arc<ForwardMetrics>,
    ) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(listen_addr).map_err(|source| RelayError::Bind {
            addr: listen_addr,
            source,
        })?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;

        Ok(Self {
            socket,
            forward_addr,
            stats,
            metrics,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn run(self, exit: Arc<AtomicBool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while !exit.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, src)) => self.relay(&buf[..len], src),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => {
                    self.metrics.receive_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Failed to receive data: {e}");
                }
            }
        }

        info!("Exiting forwarder thread");
    }

    fn relay(&self, payload: &[u8], src: SocketAddr) {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);

        if !self.stats.record_message(src.ip().to_canonical()) {
            self.metrics.unmeasured.fetch_add(1, Ordering::Relaxed);
        }

        match self.socket.send_to(payload, self.forward_addr) {
            Ok(_) => {
                self.metrics.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Failed to forward {} bytes from {src} to {}: {e}",
                    payload.len(),
                    self.forward_addr
                );
            }
        }
    }
}
