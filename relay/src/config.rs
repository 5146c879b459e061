use std::{
    fs,
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::error::RelayError;

pub const DEFAULT_LISTEN_PORT: u16 = 514;
pub const DEFAULT_REMOTE_PORT: u16 = 514;
pub const DEFAULT_HTTP_PORT: u16 = 8514;
pub const DEFAULT_ROTATE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CONFIG_FILE: &str = "config.ini";

/// Resolved, immutable settings handed to the relay at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen_port: u16,
    pub remote_port: u16,
    pub http_port: u16,
    pub forward_ip: Ipv4Addr,
    pub rotate_interval: Duration,
    pub silent: bool,
    pub daemon: bool,
}

impl RelayConfig {
    pub fn forward_addr(&self) -> SocketAddr {
        SocketAddr::from((self.forward_ip, self.remote_port))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.listen_port))
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.http_port))
    }

    /// Whether the periodic stats summary goes to the console.
    pub fn print_stats(&self) -> bool {
        !self.silent && !self.daemon
    }
}

/// One source of settings (command line or config file). Unset values fall
/// through to the next layer and finally to the defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub listen_port: Option<u16>,
    pub remote_port: Option<u16>,
    pub http_port: Option<u16>,
    pub forward_ip: Option<String>,
    pub rotate_interval_secs: Option<u64>,
}

impl ConfigLayer {
    /// Values set in `self` win over values in `lower`.
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            listen_port: self.listen_port.or(lower.listen_port),
            remote_port: self.remote_port.or(lower.remote_port),
            http_port: self.http_port.or(lower.http_port),
            forward_ip: self.forward_ip.or(lower.forward_ip),
            rotate_interval_secs: self.rotate_interval_secs.or(lower.rotate_interval_secs),
        }
    }

    /// Parse `key = value` lines. Blank lines and `#`/`;` comments are skipped.
    pub fn parse(contents: &str, path: &Path) -> Result<ConfigLayer, RelayError> {
        let mut layer = ConfigLayer::default();

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                debug!("Ignoring config line without '=' at {}:{}", path.display(), idx + 1);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            let line_no = idx + 1;

            match key {
                "listen_port" => layer.listen_port = Some(parse_value(value, key, path, line_no)?),
                "remote_port" => layer.remote_port = Some(parse_value(value, key, path, line_no)?),
                "http_port" => layer.http_port = Some(parse_value(value, key, path, line_no)?),
                "rotate_interval" => {
                    layer.rotate_interval_secs = Some(parse_value(value, key, path, line_no)?)
                }
                "forward_ip" => layer.forward_ip = Some(value.to_string()),
                other => debug!(
                    "Ignoring unknown config key {other:?} at {}:{line_no}",
                    path.display()
                ),
            }
        }

        Ok(layer)
    }

    /// Load a config file. A missing file is not an error and yields an
    /// empty layer.
    pub fn load(path: impl AsRef<Path>) -> Result<ConfigLayer, RelayError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => {
                info!("Loaded config file {}", path.display());
                Self::parse(&contents, path)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(ConfigLayer::default())
            }
            Err(e) => Err(RelayError::Config {
                path: path.to_path_buf(),
                line: 0,
                message: e.to_string(),
            }),
        }
    }

    /// Apply defaults and validate. `forward_ip` has no default.
    pub fn resolve(self, silent: bool, daemon: bool) -> Result<RelayConfig, RelayError> {
        let forward_ip = self
            .forward_ip
            .filter(|ip| !ip.is_empty())
            .ok_or(RelayError::MissingForwardIp)?;
        let forward_ip = Ipv4Addr::from_str(&forward_ip)
            .map_err(|_| RelayError::InvalidForwardIp(forward_ip.clone()))?;

        let rotate_interval_secs = self
            .rotate_interval_secs
            .unwrap_or(DEFAULT_ROTATE_INTERVAL_SECS)
            .max(1);

        Ok(RelayConfig {
            listen_port: self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
            remote_port: self.remote_port.unwrap_or(DEFAULT_REMOTE_PORT),
            http_port: self.http_port.unwrap_or(DEFAULT_HTTP_PORT),
            forward_ip,
            rotate_interval: Duration::from_secs(rotate_interval_secs),
            silent,
            daemon,
        })
    }
}

fn parse_value<T: FromStr>(
    value: &str,
    key: &str,
    path: &Path,
    line: usize,
) -> Result<T, RelayError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| RelayError::Config {
        path: PathBuf::from(path),
        line,
        message: format!("invalid value {value:?} for {key}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> Result<ConfigLayer, RelayError> {
        ConfigLayer::parse(contents, Path::new("test.ini"))
    }

    #[test]
    fn parses_known_keys_with_whitespace() {
        let layer = parse(
            "listen_port = 9000\n  remote_port=9001 \nhttp_port =9090\r\nforward_ip = 10.0.0.5\n",
        )
        .unwrap();

        assert_eq!(layer.listen_port, Some(9000));
        assert_eq!(layer.remote_port, Some(9001));
        assert_eq!(layer.http_port, Some(9090));
        assert_eq!(layer.forward_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(layer.rotate_interval_secs, None);
    }

    #[test]
    fn skips_comments_blank_and_unknown_lines() {
        let layer = parse("# comment\n; other\n\nfoo = bar\nnot a pair\nhttp_port=1\n").unwrap();
        assert_eq!(
            layer,
            ConfigLayer {
                http_port: Some(1),
                ..Default::default()
            }
        );
    }

    #[test]
    fn bad_port_reports_line() {
        let err = parse("\nlisten_port = abc\n").unwrap_err();
        match err {
            RelayError::Config { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("listen_port"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn upper_layer_wins() {
        let cli = ConfigLayer {
            listen_port: Some(1),
            forward_ip: Some("1.1.1.1".into()),
            ..Default::default()
        };
        let file = ConfigLayer {
            listen_port: Some(2),
            remote_port: Some(3),
            forward_ip: Some("2.2.2.2".into()),
            ..Default::default()
        };

        let merged = cli.or(file);
        assert_eq!(merged.listen_port, Some(1));
        assert_eq!(merged.remote_port, Some(3));
        assert_eq!(merged.forward_ip.as_deref(), Some("1.1.1.1"));
    }

    #[test]
    fn resolve_applies_defaults() {
        let config = ConfigLayer {
            forward_ip: Some("127.0.0.1".into()),
            ..Default::default()
        }
        .resolve(false, false)
        .unwrap();

        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(config.remote_port, DEFAULT_REMOTE_PORT);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.rotate_interval, Duration::from_secs(30));
        assert_eq!(config.forward_addr(), "127.0.0.1:514".parse().unwrap());
        assert!(config.print_stats());
    }

    #[test]
    fn resolve_requires_forward_ip() {
        assert!(matches!(
            ConfigLayer::default().resolve(false, false),
            Err(RelayError::MissingForwardIp)
        ));
        assert!(matches!(
            ConfigLayer {
                forward_ip: Some(String::new()),
                ..Default::default()
            }
            .resolve(false, false),
            Err(RelayError::MissingForwardIp)
        ));
    }

    #[test]
    fn resolve_rejects_invalid_forward_ip() {
        let err = ConfigLayer {
            forward_ip: Some("not.an.ip".into()),
            ..Default::default()
        }
        .resolve(false, false)
        .unwrap_err();
        assert!(matches!(err, RelayError::InvalidForwardIp(ip) if ip == "not.an.ip"));
    }

    #[test]
    fn daemon_or_silent_suppresses_stats_output() {
        let layer = ConfigLayer {
            forward_ip: Some("127.0.0.1".into()),
            ..Default::default()
        };
        assert!(!layer.clone().resolve(true, false).unwrap().print_stats());
        assert!(!layer.resolve(false, true).unwrap().print_stats());
    }

    #[test]
    fn missing_file_is_empty_layer() {
        let layer = ConfigLayer::load("/nonexistent/udp-stats-relay.ini").unwrap();
        assert_eq!(layer, ConfigLayer::default());
    }
}
