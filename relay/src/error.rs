use std::{net::SocketAddr, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid forward IP address: {0}")]
    InvalidForwardIp(String),

    #[error("No forward IP provided. Either use a config file or pass the IP as an argument.")]
    MissingForwardIp,

    #[error("Config error in {path}:{line}: {message}")]
    Config {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed to daemonize: {0}")]
    Daemon(String),

    #[error("Failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
