use std::{
    io::{ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::{
    config::RelayConfig,
    error::RelayError,
    stats::{StatsSnapshot, StatsTable},
};

pub const REQUEST_BUFFER_SIZE: usize = 4096;
const LISTEN_BACKLOG: i32 = 5;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Upper bound on how long one slow client can hold the accept loop.
pub const CLIENT_IO_TIMEOUT: Duration = Duration::from_secs(5);
/// How long unread request bytes are discarded after the response is sent.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Api,
    Dashboard,
}

impl Route {
    /// Anything whose request target contains `/api` gets JSON; everything
    /// else, malformed requests included, gets the dashboard.
    pub fn from_request(request: &[u8]) -> Self {
        let text = String::from_utf8_lossy(request);
        let target = text
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default();

        if target.contains("/api") {
            Route::Api
        } else {
            Route::Dashboard
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiClient {
    pub ip: String,
    pub average_logs_per_second: u64,
    pub total_messages: u64,
}

/// Body of `GET /api`. Field names are relied on by existing dashboards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub clients: Vec<ApiClient>,
    pub total_logs_per_second: u64,
    pub total_logs_per_hour: u64,
    pub forward_ip: String,
    pub listen_port: u16,
    pub remote_port: u16,
    pub http_port: u16,
    pub num_clients: usize,
}

impl ApiResponse {
    pub fn new(snapshot: &StatsSnapshot, config: &RelayConfig) -> Self {
        Self {
            clients: snapshot
                .clients
                .iter()
                .map(|c| ApiClient {
                    ip: c.address.to_string(),
                    average_logs_per_second: c.average_per_second(),
                    total_messages: c.total,
                })
                .collect(),
            total_logs_per_second: snapshot.total_logs_per_second(),
            total_logs_per_hour: snapshot.total_logs_per_hour(),
            forward_ip: config.forward_ip.to_string(),
            listen_port: config.listen_port,
            remote_port: config.remote_port,
            http_port: config.http_port,
            num_clients: snapshot.num_clients(),
        }
    }
}

pub const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>UDP Forwarder Stats</title>
<script>
async function fetchStats() {
  const response = await fetch('/api');
  return response.json();
}

function renderClients(data) {
  let table = '<table border="1"><tr style="background-color: lightblue;">'
    + '<th>IP Address</th><th>Average Logs per Second (Last Minute)</th><th>Total Messages</th></tr>';
  if (data.clients.length > 0) {
    data.clients.forEach(client => {
      table += `<tr><td>${client.ip}</td><td>${client.average_logs_per_second}</td><td>${client.total_messages}</td></tr>`;
    });
  } else {
    table += '<tr><td colspan="3">No data available</td></tr>';
  }
  table += '</table><br><br>';
  document.getElementById('stats').innerHTML = table;
}

function renderGlobal(data) {
  let table = '<table border="1"><tr style="background-color: lightblue;">'
    + '<th>Total Logs per Second</th><th>Total Logs per Hour</th><th>Forward IP</th>'
    + '<th>Listen Port</th><th>Remote Port</th><th>HTTP Port</th><th>Number of Clients</th></tr>';
  table += `<tr><td>${data.total_logs_per_second}</td><td>${data.total_logs_per_hour}</td><td>${data.forward_ip}</td>`
    + `<td>${data.listen_port}</td><td>${data.remote_port}</td><td>${data.http_port}</td><td>${data.num_clients}</td></tr>`;
  table += '</table>';
  document.getElementById('global_stats').innerHTML = table;
}

async function refresh() {
  try {
    const data = await fetchStats();
    renderClients(data);
    renderGlobal(data);
  } catch (e) {
    console.error('Failed to load stats', e);
  }
}

setInterval(refresh, 5000);
window.onload = refresh;
</script>
</head>
<body>
<h1>UDP Forwarder Stats</h1>
<div id="stats"></div>
<div id="global_stats"></div>
</body>
</html>
"#;

/// Read until the request line is complete, the peer stops sending or the
/// buffer is full. Anything past the buffer is left unread.
fn read_request_line(stream: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut len = 0;
    while len < buf.len() {
        let n = stream.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
        if buf[..len].windows(2).any(|w| w == b"\r\n") {
            break;
        }
    }
    Ok(len)
}

/// Discard what is left of an oversized request so closing the socket sends
/// FIN rather than RST and the client still sees the response.
fn drain(stream: &mut TcpStream) {
    if stream.set_read_timeout(Some(DRAIN_TIMEOUT)).is_err() {
        return;
    }
    let mut scratch = [0u8; REQUEST_BUFFER_SIZE];
    let mut discarded = 0;
    while discarded < 16 * REQUEST_BUFFER_SIZE {
        match stream.read(&mut scratch) {
            Ok(0) | Err(_) => break,
            Ok(n) => discarded += n,
        }
    }
}

fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// Single-threaded status endpoint: one connection at a time, one request per
/// connection.
pub struct StatusServer {
    listener: TcpListener,
    config: Arc<RelayConfig>,
    stats: Arc<StatsTable>,
    client_timeout: Duration,
}

impl StatusServer {
    pub fn bind(
        addr: SocketAddr,
        config: Arc<RelayConfig>,
        stats: Arc<StatsTable>,
    ) -> Result<Self, RelayError> {
        let bind_err = move |source: std::io::Error| RelayError::Bind { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

        let listener: TcpListener = socket.into();
        // polled so the loop can observe the exit flag
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            config,
            stats,
            client_timeout: CLIENT_IO_TIMEOUT,
        })
    }

    /// Override the per-connection read/write timeout.
    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn run(self, exit: Arc<AtomicBool>) {
        while !exit.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("New status connection from {peer}");
                    self.serve(stream, peer);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("Failed to accept TCP connection: {e}");
                    // EMFILE and friends persist; do not spin on them
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        info!("Exiting status server thread");
    }

    fn serve(&self, mut stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream
            .set_nonblocking(false)
            .and_then(|_| stream.set_read_timeout(Some(self.client_timeout)))
            .and_then(|_| stream.set_write_timeout(Some(self.client_timeout)))
        {
            warn!("Failed to configure connection from {peer}: {e}");
            return;
        }

        let mut request = [0u8; REQUEST_BUFFER_SIZE];
        let len = match read_request_line(&mut stream, &mut request) {
            Ok(len) => len,
            Err(e) => {
                warn!("Failed to receive data from {peer}: {e}");
                return;
            }
        };

        let response = self.respond(&request[..len]);
        if let Err(e) = stream.write_all(&response).and_then(|_| stream.flush()) {
            warn!("Failed to send response to {peer}: {e}");
            return;
        }
        let _ = stream.shutdown(Shutdown::Write);
        drain(&mut stream);
    }

    /// Build the full response for one raw request.
    pub fn respond(&self, request: &[u8]) -> Vec<u8> {
        match Route::from_request(request) {
            Route::Api => {
                let body = ApiResponse::new(&self.stats.snapshot(), &self.config);
                match serde_json::to_vec(&body) {
                    Ok(json) => http_response("200 OK", "application/json", &json),
                    Err(e) => {
                        warn!("Failed to serialize stats: {e}");
                        http_response("500 Internal Server Error", "text/plain", b"")
                    }
                }
            }
            Route::Dashboard => http_response("200 OK", "text/html", DASHBOARD_HTML.as_bytes()),
        }
    }
}
