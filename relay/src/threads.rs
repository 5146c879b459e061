use crossbeam_channel::{Receiver, Sender};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use crate::error::RelayError;

pub struct ThreadHandle<T> {
    handle: JoinHandle<T>,
    name: String,
}

impl<T> ThreadHandle<T> {
    pub fn new(handle: JoinHandle<T>, name: String) -> Self {
        Self { handle, name }
    }

    pub fn join(self) {
        if let Err(e) = self.handle.join() {
            error!("Failed to join thread {}: {:?}", self.name, e);
        }
    }
}

/// Owns the relay's worker threads. Every worker gets the shared exit flag
/// and a shutdown receiver; dropping the manager stops and joins them.
pub struct ThreadManager {
    exit: Arc<AtomicBool>,
    shutdown_sender: Sender<()>,
    shutdown_receiver: Receiver<()>,
    handles: Vec<ThreadHandle<()>>,
    shutdown_initiated: AtomicBool,
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadManager {
    pub fn new() -> Self {
        let exit = Arc::new(AtomicBool::new(false));
        // zero capacity: dropping the sender wakes every select! at once
        let (shutdown_sender, shutdown_receiver) = crossbeam_channel::bounded(0);

        Self {
            exit,
            shutdown_sender,
            shutdown_receiver,
            handles: Vec::new(),
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    pub fn spawn<F>(&mut self, name: &str, f: F) -> Result<(), RelayError>
    where
        F: FnOnce(Arc<AtomicBool>, Receiver<()>) + Send + 'static,
    {
        let exit = self.exit.clone();
        let shutdown_rx = self.shutdown_receiver.clone();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || f(exit, shutdown_rx))
            .map_err(|source| RelayError::Spawn {
                name: name.to_string(),
                source,
            })?;

        debug!("Spawned thread {name}");
        self.handles
            .push(ThreadHandle::new(handle, name.to_string()));
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating thread manager shutdown");
            self.exit.store(true, Ordering::SeqCst);

            // disconnect the channel so every receiver clone observes it
            let (sender, _) = crossbeam_channel::bounded(0);
            drop(std::mem::replace(&mut self.shutdown_sender, sender));

            while let Some(handle) = self.handles.pop() {
                handle.join();
            }

            info!("Thread manager shutdown complete");
        }
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn shutdown_wakes_all_select_loops() {
        let mut manager = ThreadManager::new();
        let stopped = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let stopped = stopped.clone();
            manager
                .spawn(&format!("worker_{i}"), move |exit, shutdown_rx| {
                    let tick = crossbeam_channel::tick(Duration::from_secs(60));
                    while !exit.load(Ordering::Relaxed) {
                        crossbeam_channel::select! {
                            recv(tick) -> _ => {}
                            recv(shutdown_rx) -> _ => break,
                        }
                    }
                    stopped.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        manager.shutdown();
        assert_eq!(stopped.load(Ordering::SeqCst), 3);

        // idempotent
        manager.shutdown();
    }
}
