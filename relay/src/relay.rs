use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::info;

use crate::{
    config::RelayConfig,
    error::RelayError,
    forwarder::{ForwardMetrics, UdpForwarder},
    http::StatusServer,
    rotation::{start_rotation_thread, RotationConfig},
    stats::StatsTable,
    threads::ThreadManager,
};

/// Owns the three relay threads and the state they share.
pub struct UdpStatsRelay {
    config: Arc<RelayConfig>,
    stats: Arc<StatsTable>,
    metrics: Arc<ForwardMetrics>,
    thread_manager: ThreadManager,
    udp_addr: Option<SocketAddr>,
    http_addr: Option<SocketAddr>,
    shutdown_initiated: AtomicBool,
}

impl UdpStatsRelay {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self {
            config,
            stats: Arc::new(StatsTable::new()),
            metrics: Arc::new(ForwardMetrics::new()),
            thread_manager: ThreadManager::new(),
            udp_addr: None,
            http_addr: None,
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    /// Bind both sockets, then spawn the forwarder, status server and
    /// rotation timer. Nothing is spawned if either bind fails.
    pub fn start(&mut self) -> Result<(), RelayError> {
        info!("Starting UDP stats relay...");

        let forwarder = UdpForwarder::bind(
            self.config.listen_addr(),
            self.config.forward_addr(),
            self.stats.clone(),
            self.metrics.clone(),
        )?;
        let server = StatusServer::bind(
            self.config.http_addr(),
            self.config.clone(),
            self.stats.clone(),
        )?;

        let udp_addr = forwarder.local_addr()?;
        let http_addr = server.local_addr()?;

        self.thread_manager
            .spawn("status_http", move |exit, _| server.run(exit))?;
        info!("TCP server listening on port {}", http_addr.port());

        start_rotation_thread(
            &mut self.thread_manager,
            RotationConfig {
                interval: self.config.rotate_interval,
                print_stats: self.config.print_stats(),
            },
            self.stats.clone(),
            self.metrics.clone(),
        )?;

        self.thread_manager
            .spawn("udp_forwarder", move |exit, _| forwarder.run(exit))?;
        info!(
            "Listening for UDP packets on port {} and forwarding to {}",
            udp_addr.port(),
            self.config.forward_addr()
        );

        self.udp_addr = Some(udp_addr);
        self.http_addr = Some(http_addr);
        Ok(())
    }

    pub fn stats(&self) -> Arc<StatsTable> {
        self.stats.clone()
    }

    pub fn metrics(&self) -> Arc<ForwardMetrics> {
        self.metrics.clone()
    }

    /// Bound UDP listen address, once started.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// Bound HTTP address, once started.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Stop all threads. Both sockets are closed once their threads return.
    pub fn shutdown(&mut self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating shutdown sequence");
            self.thread_manager.shutdown();
            info!("Shutdown complete");
        }
    }
}

impl Drop for UdpStatsRelay {
    fn drop(&mut self) {
        self.shutdown();
    }
}
