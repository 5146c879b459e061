//! Command-line arguments for the relay binary.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::config::{ConfigLayer, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "udp-stats-relay",
    about = "Forward UDP datagrams to a single collector and serve per-source statistics over HTTP",
    disable_version_flag = true
)]
pub struct Args {
    /// UDP port to listen on (default 514)
    #[arg(short = 'l', long)]
    pub listen_port: Option<u16>,

    /// Destination port datagrams are forwarded to (default 514)
    #[arg(short = 'r', long)]
    pub remote_port: Option<u16>,

    /// Port for the HTTP status page (default 8514)
    #[arg(short = 'w', long)]
    pub http_port: Option<u16>,

    /// key=value configuration file; command-line values override it
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Seconds between stats window rotations (default 30)
    #[arg(long)]
    pub rotate_interval: Option<u64>,

    /// Detach from the terminal and suppress all console output
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Do not print the periodic stats summary
    #[arg(short = 's', long)]
    pub silent: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long)]
    pub verbose: bool,

    /// Print version and exit
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    pub version: bool,

    /// IPv4 address of the collector
    pub forward_ip: Option<String>,
}

impl Args {
    /// Settings given on the command line, as the highest-priority layer.
    pub fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            listen_port: self.listen_port,
            remote_port: self.remote_port,
            http_port: self.http_port,
            forward_ip: self.forward_ip.clone(),
            rotate_interval_secs: self.rotate_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let args = Args::try_parse_from([
            "udp-stats-relay",
            "-l",
            "9000",
            "-r",
            "9001",
            "-w",
            "9090",
            "-s",
            "-c",
            "relay.ini",
            "127.0.0.1",
        ])
        .unwrap();

        assert_eq!(args.listen_port, Some(9000));
        assert_eq!(args.remote_port, Some(9001));
        assert_eq!(args.http_port, Some(9090));
        assert!(args.silent);
        assert!(!args.daemon);
        assert_eq!(args.config, PathBuf::from("relay.ini"));
        assert_eq!(args.layer().forward_ip.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn defaults_leave_layer_empty() {
        let args = Args::try_parse_from(["udp-stats-relay"]).unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert_eq!(args.layer(), ConfigLayer::default());
    }

    #[test]
    fn short_v_is_version() {
        let args = Args::try_parse_from(["udp-stats-relay", "-v"]).unwrap();
        assert!(args.version);
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(Args::try_parse_from(["udp-stats-relay", "-l", "70000", "1.2.3.4"]).is_err());
    }
}
