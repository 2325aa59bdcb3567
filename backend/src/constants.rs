/// HTTP Status Codes
pub mod http {
    use http::StatusCode;

    pub const FORBIDDEN: StatusCode = StatusCode::FORBIDDEN;
}

/// Network Configuration
pub mod network {
    /// Address of the real services, as seen from inside the proxy container.
    pub const BACKEND_HOST: &str = "172.17.0.1";
    pub const BIND_HOST: &str = "::";
    pub const LISTEN_BACKLOG: u32 = 100;
    pub const READ_CHUNK_SIZE: usize = 8 * 1024;
}

/// Framing limits
pub mod framing {
    pub const MAX_HEADER_BYTES: usize = 64 * 1024;
    pub const MAX_HEADERS: usize = 100;
    pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
}

/// Timeouts (milliseconds/seconds)
pub mod timeout {
    pub const BROKER_MS: u64 = 2_000;
    pub const CONNECT_MS: u64 = 3_000;
    pub const IDLE_SECS: u64 = 300;
    pub const SHUTDOWN_GRACE_MS: u64 = 2_000;
}

/// Service supervision
pub mod supervisor {
    pub const MAX_CONNECTIONS: usize = 512;
    pub const MAX_RESTARTS: u32 = 3;
    pub const RESTART_DELAY_MS: u64 = 1_000;
}

/// Block notice
pub mod notice {
    pub const MARKER: &str = "[CTF-PROXY] BLOCKED";
}

/// Broker
pub mod broker {
    pub const QUEUE_CAPACITY: usize = 1024;
    pub const SOCKET_PATH: &str = "/tmp/ctf-proxy-broker.sock";
}

/// Default file locations
pub mod paths {
    pub const CONFIG_PATH: &str = "data/config.json";
    pub const FILTERS_PATH: &str = "data/filters.json";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE: &str = "proxy.log";
}
