//! Configuration loading
//!
//! Both programs read a small TOML file once at startup:
//!
//! ```text
//! # server
//! port = 8080
//! logging = true
//! XML = true
//! ```
//!
//! Every key is optional. A missing file means defaults; an unreadable
//! file, a syntax error, an unknown key or a mistyped value is a
//! [`ConfigError`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::backlog::DEFAULT_BACKLOG_CAPACITY;
use crate::codec::CodecKind;
use crate::error::ConfigError;
use crate::frame::DEFAULT_MAX_FRAME_LEN;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Default per-connection outbound queue capacity
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Server settings, immutable after loading
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Verbose diagnostic logging when `RUST_LOG` is unset
    pub logging: bool,
    pub codec: CodecKind,
    pub outbound_capacity: usize,
    pub max_frame_len: usize,
    pub backlog_capacity: usize,
    /// How long connections get to flush "Server closed" on shutdown
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            logging: false,
            codec: CodecKind::Xml,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl ServerConfig {
    /// Load from a file, falling back to defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match read_optional(path.as_ref())? {
            Some(text) => Self::parse(&text),
            None => Ok(Self::default()),
        }
    }

    /// Parse the file contents over the defaults
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let file: ServerFile = toml::from_str(text)?;
        let mut config = Self::default();
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(xml) = file.xml {
            config.codec = CodecKind::from_xml_flag(xml);
        }
        Ok(config)
    }
}

/// Server keys as they appear in the file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerFile {
    port: Option<u16>,
    logging: Option<bool>,
    #[serde(rename = "XML")]
    xml: Option<bool>,
}

/// Client settings, immutable after loading
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub codec: CodecKind,
    /// Program tag sent with every login
    pub client_tag: String,
    pub outbound_capacity: usize,
    pub max_frame_len: usize,
    /// How long `close()` waits for the logout to flush
    pub close_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            codec: CodecKind::Xml,
            client_tag: concat!("tcp_chat/", env!("CARGO_PKG_VERSION")).to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            close_grace: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Load from a file, falling back to defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match read_optional(path.as_ref())? {
            Some(text) => Self::parse(&text),
            None => Ok(Self::default()),
        }
    }

    /// Parse the file contents over the defaults
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let file: ClientFile = toml::from_str(text)?;
        let mut config = Self::default();
        if let Some(xml) = file.xml {
            config.codec = CodecKind::from_xml_flag(xml);
        }
        Ok(config)
    }
}

/// Client keys as they appear in the file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClientFile {
    #[serde(rename = "XML")]
    xml: Option<bool>,
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_parse() {
        let text = "# chat server\nport = 9000\nlogging=true\n\nXML = false\n";
        let config = ServerConfig::parse(text).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.logging);
        assert_eq!(config.codec, CodecKind::Binary);
        assert_eq!(config.backlog_capacity, 10);
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.logging);
        assert_eq!(config.codec, CodecKind::Xml);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ServerConfig::parse("port = 1\ncolour = \"blue\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_bad_value_rejected() {
        let err = ServerConfig::parse("port = \"eighty\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = ServerConfig::parse("port = 70000").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = ClientConfig::parse("XML = maybe").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_malformed_line_rejected() {
        let err = ClientConfig::parse("XML").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_client_rejects_server_keys() {
        let err = ClientConfig::parse("port = 80").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_client_config_parse() {
        let config = ClientConfig::parse("# client\nXML = false\n").unwrap();
        assert_eq!(config.codec, CodecKind::Binary);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ClientConfig::load("/nonexistent/tcp_chat/config.txt").unwrap();
        assert_eq!(config.codec, CodecKind::Xml);
        assert!(config.client_tag.starts_with("tcp_chat/"));
    }
}
