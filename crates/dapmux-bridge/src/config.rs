//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Transport and identity settings for one bridged debugging session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Endpoint of the debugpy stream socket, e.g. `tcp://127.0.0.1:5678`.
    pub backend_endpoint: String,
    /// Endpoint the broadcast (PUB) channel connects to.
    pub publish_endpoint: String,
    /// Endpoint of the kernel control (REP) channel.
    pub control_endpoint: String,
    /// Endpoint of the correlation-header (REP) channel.
    pub header_endpoint: String,
    /// Linger applied to all four sockets, in milliseconds, so
    /// teardown never blocks indefinitely on unsent data.
    #[serde(default = "default_linger_ms")]
    pub linger_ms: i32,
    /// User name stamped into published event headers.
    pub user_name: String,
    /// Session id stamped into published event headers.
    pub session_id: String,
    /// Source path debugpy reports for kernel-synthesized wrapper
    /// code; a lone stack frame at this path marks a spurious stop.
    #[serde(default = "default_synthetic_path")]
    pub synthetic_path: String,
}

fn default_linger_ms() -> i32 {
    1000
}

fn default_synthetic_path() -> String {
    "<string>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_in() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{
                "backend_endpoint": "tcp://127.0.0.1:5678",
                "publish_endpoint": "tcp://127.0.0.1:6001",
                "control_endpoint": "tcp://127.0.0.1:6002",
                "header_endpoint": "tcp://127.0.0.1:6003",
                "user_name": "kernel",
                "session_id": "abc"
            }"#,
        )
        .unwrap();
        assert_eq!(config.linger_ms, 1000);
        assert_eq!(config.synthetic_path, "<string>");
    }

    #[test]
    fn config_round_trips() {
        let config = BridgeConfig {
            backend_endpoint: "tcp://127.0.0.1:5678".into(),
            publish_endpoint: "tcp://127.0.0.1:6001".into(),
            control_endpoint: "tcp://127.0.0.1:6002".into(),
            header_endpoint: "tcp://127.0.0.1:6003".into(),
            linger_ms: 250,
            user_name: "kernel".into(),
            session_id: "abc".into(),
            synthetic_path: "<string>".into(),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
