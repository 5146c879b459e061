use std::{
    fmt::Write as _,
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use crossbeam_channel::tick;
use tracing::debug;

use crate::{
    error::RelayError,
    forwarder::ForwardMetrics,
    stats::{StatsSnapshot, StatsTable},
    threads::ThreadManager,
};

pub struct RotationConfig {
    pub interval: Duration,
    pub print_stats: bool,
}

/// Spawn the timer that advances every client's window once per interval.
/// The console summary, when enabled, is printed before the rotation so it
/// shows the interval that just ended.
pub fn start_rotation_thread(
    thread_manager: &mut ThreadManager,
    config: RotationConfig,
    stats: Arc<StatsTable>,
    metrics: Arc<ForwardMetrics>,
) -> Result<(), RelayError> {
    thread_manager.spawn("stats_rotation", move |exit, shutdown_rx| {
        let rotation_tick = tick(config.interval);

        while !exit.load(Ordering::Relaxed) {
            crossbeam_channel::select! {
                recv(rotation_tick) -> _ => {
                    if config.print_stats {
                        print!("{}", render_summary(&stats.snapshot()));
                    }
                    stats.rotate();
                    metrics.report();
                }
                recv(shutdown_rx) -> _ => break,
            }
        }

        debug!("Exiting rotation thread");
    })
}

/// Operator-facing text summary of a snapshot.
pub fn render_summary(snapshot: &StatsSnapshot) -> String {
    let mut out = String::from("--- Stats ---\n");

    for client in &snapshot.clients {
        let _ = writeln!(
            out,
            "Source IP: {}, Average logs per second (last minute): {}, Total logs per hour: {}",
            client.address,
            client.average_per_second(),
            client.total
        );
    }

    let _ = write!(
        out,
        "\nTotal connected clients: {}\n\
         Average forwarded logs per second (last minute): {}\n\
         Total forwarded logs per hour: {}\n",
        snapshot.num_clients(),
        snapshot.total_logs_per_second(),
        snapshot.total_logs_per_hour()
    );

    out
}
