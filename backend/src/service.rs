use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire protocol spoken by a protected service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    Tcp,
    Http,
    Https,
}

impl ProtocolType {
    /// HTTPS traffic is relayed without termination, so it is framed like HTTP.
    pub fn is_http(self) -> bool {
        matches!(self, ProtocolType::Http | ProtocolType::Https)
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolType::Tcp => "tcp",
            ProtocolType::Http => "http",
            ProtocolType::Https => "https",
        };
        f.write_str(s)
    }
}

impl FromStr for ProtocolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(ProtocolType::Tcp),
            "http" => Ok(ProtocolType::Http),
            "https" => Ok(ProtocolType::Https),
            other => Err(format!("unknown protocol type '{}'", other)),
        }
    }
}

/// A network service defended by the proxy.
///
/// Two services are equal only when every field matches, so a service that
/// changed port or protocol is a different subscriber as far as the filter
/// registry is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub protocol_type: ProtocolType,
    pub active: bool,
}

impl Service {
    pub fn new(name: impl Into<String>, port: u16, protocol_type: ProtocolType) -> Self {
        Self {
            name: name.into(),
            port,
            protocol_type,
            active: true,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.port, self.protocol_type)
    }
}
