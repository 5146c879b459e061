use std::{collections::HashMap, net::IpAddr};

use parking_lot::Mutex;

/// Number of buckets in each client's sliding window.
pub const HISTORY_SECONDS: usize = 60;
/// Maximum number of distinct source addresses tracked.
pub const MAX_CLIENTS: usize = 100;

#[derive(Clone, Debug)]
struct ClientRecord {
    address: IpAddr,
    window: [u64; HISTORY_SECONDS],
    total: u64,
}

impl ClientRecord {
    fn new(address: IpAddr) -> Self {
        let mut window = [0; HISTORY_SECONDS];
        window[HISTORY_SECONDS - 1] = 1;
        Self {
            address,
            window,
            total: 1,
        }
    }

    fn record(&mut self) {
        self.window[HISTORY_SECONDS - 1] += 1;
        self.total += 1;
    }

    fn rotate(&mut self) {
        self.window.copy_within(1.., 0);
        self.window[HISTORY_SECONDS - 1] = 0;
    }
}

#[derive(Default)]
struct Inner {
    // insertion order is display order
    records: Vec<ClientRecord>,
    index: HashMap<IpAddr, usize>,
}

/// Bounded per-source message counters shared by the forwarder, the rotation
/// timer and the status server.
///
/// The first [`MAX_CLIENTS`] distinct addresses get a record; traffic from any
/// further address is not measured and nothing is ever evicted.
pub struct StatsTable {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for StatsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTable {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CLIENTS)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                records: Vec::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
            }),
        }
    }

    /// Count one message from `address`. Returns false when the table is full
    /// and the address is not tracked.
    pub fn record_message(&self, address: IpAddr) -> bool {
        let mut inner = self.inner.lock();
        if let Some(&idx) = inner.index.get(&address) {
            inner.records[idx].record();
            return true;
        }

        if inner.records.len() >= self.capacity {
            return false;
        }

        let idx = inner.records.len();
        inner.records.push(ClientRecord::new(address));
        inner.index.insert(address, idx);
        true
    }

    /// Advance every window by one bucket, dropping the oldest.
    pub fn rotate(&self) {
        let mut inner = self.inner.lock();
        for record in inner.records.iter_mut() {
            record.rotate();
        }
    }

    /// Point-in-time copy of every record. The lock is released before the
    /// caller sees the result.
    pub fn snapshot(&self) -> StatsSnapshot {
        let clients = {
            let inner = self.inner.lock();
            inner
                .records
                .iter()
                .map(|r| ClientSnapshot {
                    address: r.address,
                    window: r.window,
                    total: r.total,
                })
                .collect()
        };
        StatsSnapshot { clients }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub address: IpAddr,
    pub window: [u64; HISTORY_SECONDS],
    pub total: u64,
}

impl ClientSnapshot {
    pub fn window_sum(&self) -> u64 {
        self.window.iter().sum()
    }

    /// Messages counted since the last rotation.
    pub fn current_bucket(&self) -> u64 {
        self.window[HISTORY_SECONDS - 1]
    }

    /// Sum of the window divided by its full length, truncated. Clients with
    /// less than a full window of history are still divided by 60.
    pub fn average_per_second(&self) -> u64 {
        self.window_sum() / HISTORY_SECONDS as u64
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatsSnapshot {
    pub clients: Vec<ClientSnapshot>,
}

impl StatsSnapshot {
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn total_logs_per_second(&self) -> u64 {
        self.clients.iter().map(ClientSnapshot::average_per_second).sum()
    }

    /// Sum of lifetime totals. The name is kept for existing dashboards.
    pub fn total_logs_per_hour(&self) -> u64 {
        self.clients.iter().map(|c| c.total).sum()
    }

    pub fn get(&self, address: IpAddr) -> Option<&ClientSnapshot> {
        self.clients.iter().find(|c| c.address == address)
    }
}
