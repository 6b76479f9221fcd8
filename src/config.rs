use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_VIDEO_PAGE: &str = "/video.html";
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Optional TOML file; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub video_page: Option<String>,
    pub chunk_size: Option<usize>,
}

/// Validated server settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    pub listen: SocketAddr,
    /// Always the working directory.
    pub root: PathBuf,
    pub video_page: String,
    pub chunk_size: usize,
}

#[derive(Debug)]
pub enum ValidationError {
    ReadConfig(String, String),
    ParseConfig(String, String),
    InvalidListenAddress(String),
    InvalidVideoPage(String),
    ZeroChunkSize,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ValidationError::*;
        match self {
            ReadConfig(path, e) => write!(f, "failed to read config file '{}': {}", path, e),
            ParseConfig(path, e) => write!(f, "failed to parse TOML '{}': {}", path, e),
            InvalidListenAddress(e) => write!(f, "invalid listen address: {}", e),
            InvalidVideoPage(page) => {
                write!(f, "video_page must be an absolute path, got '{}'", page)
            }
            ZeroChunkSize => write!(f, "chunk_size must be greater than zero"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Numeric, non-zero port argument; anything else means "not given".
pub fn parse_port_arg(arg: Option<&str>) -> Option<u16> {
    arg.and_then(|a| a.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
}

impl RawConfig {
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let toml_str = std::fs::read_to_string(path)
            .map_err(|e| ValidationError::ReadConfig(path.display().to_string(), e.to_string()))?;
        toml::from_str(&toml_str)
            .map_err(|e| ValidationError::ParseConfig(path.display().to_string(), e.to_string()))
    }

    /// `port_arg` wins over the file's `port`.
    pub fn validate(self, port_arg: Option<u16>) -> Result<Config, ValidationError> {
        let host = self.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip = host
            .parse::<IpAddr>()
            .map_err(|e| ValidationError::InvalidListenAddress(format!("{}: {}", host, e)))?;
        let port = port_arg
            .or(self.port.filter(|p| *p != 0))
            .unwrap_or(DEFAULT_PORT);

        let video_page = self
            .video_page
            .unwrap_or_else(|| DEFAULT_VIDEO_PAGE.to_string());
        if !video_page.starts_with('/') {
            return Err(ValidationError::InvalidVideoPage(video_page));
        }

        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ValidationError::ZeroChunkSize);
        }

        Ok(Config {
            listen: SocketAddr::new(ip, port),
            root: PathBuf::from("."),
            video_page,
            chunk_size,
        })
    }
}

impl Config {
    /// `[PORT] [CONFIG.toml]`, program name already stripped.
    pub fn from_args<I>(mut args: I) -> Result<Self, ValidationError>
    where
        I: Iterator<Item = String>,
    {
        let port_arg = parse_port_arg(args.next().as_deref());
        let raw = match args.next() {
            Some(path) => RawConfig::load(Path::new(&path))?,
            None => RawConfig::default(),
        };
        raw.validate(port_arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_argument_falls_back_to_default() {
        assert_eq!(parse_port_arg(Some("9000")), Some(9000));
        assert_eq!(parse_port_arg(Some("abc")), None);
        assert_eq!(parse_port_arg(Some("0")), None);
        assert_eq!(parse_port_arg(None), None);

        let cfg = Config::from_args(std::iter::empty()).unwrap();
        assert_eq!(cfg.listen.port(), DEFAULT_PORT);
        assert_eq!(cfg.root, PathBuf::from("."));
        assert_eq!(cfg.video_page, DEFAULT_VIDEO_PAGE);

        let cfg = Config::from_args(vec!["not-a-port".to_string()].into_iter()).unwrap();
        assert_eq!(cfg.listen.port(), DEFAULT_PORT);
    }

    #[test]
    fn file_values_and_argument_precedence() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dirserve.toml");
        std::fs::write(
            &path,
            "host = \"127.0.0.1\"\nport = 9100\nvideo_page = \"/player.html\"\nchunk_size = 512\n",
        )
        .unwrap();
        let path = path.display().to_string();

        let cfg = Config::from_args(vec!["x".to_string(), path.clone()].into_iter()).unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.video_page, "/player.html");
        assert_eq!(cfg.chunk_size, 512);

        let cfg = Config::from_args(vec!["8080".to_string(), path].into_iter()).unwrap();
        assert_eq!(cfg.listen.port(), 8080);
    }

    #[test]
    fn rejects_invalid_values() {
        let raw = RawConfig {
            host: Some("localhost:80".into()),
            ..Default::default()
        };
        assert!(matches!(
            raw.validate(None),
            Err(ValidationError::InvalidListenAddress(_))
        ));

        let raw = RawConfig {
            video_page: Some("video.html".into()),
            ..Default::default()
        };
        assert!(matches!(
            raw.validate(None),
            Err(ValidationError::InvalidVideoPage(_))
        ));

        let raw = RawConfig {
            chunk_size: Some(0),
            ..Default::default()
        };
        assert!(matches!(raw.validate(None), Err(ValidationError::ZeroChunkSize)));

        assert!(matches!(
            Config::from_args(vec!["1".into(), "/nonexistent/dirserve.toml".into()].into_iter()),
            Err(ValidationError::ReadConfig(_, _))
        ));
    }
}
