// ── Server configuration ──────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_port() -> u16 {
    9393
}
fn default_hostname() -> String {
    "127.0.0.1".to_string()
}
fn default_users() -> HashMap<String, UserAuth> {
    let mut users = HashMap::new();
    users.insert(
        "test".to_string(),
        UserAuth {
            password: Some("password".to_string()),
            public_key: None,
        },
    );
    users
}

// ── Config ───────────────────────────────────────────────────────────────────

/// Construction-time configuration for [`MockSftpServer`](crate::MockSftpServer).
///
/// By default the server listens on `127.0.0.1:9393` and knows a single user
/// `test` with password `password`. Pass port `0` to bind an ephemeral port
/// and read it back from the running server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Per-username authentication table.
    #[serde(default = "default_users")]
    pub users: HashMap<String, UserAuth>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        MockServerConfig {
            port: default_port(),
            hostname: default_hostname(),
            users: default_users(),
        }
    }
}

/// Credentials accepted for one user.
///
/// `password` is compared verbatim; `public_key` is an OpenSSH-format public
/// key line (`ssh-ed25519 AAAA... comment`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAuth {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MockServerConfig::default();
        assert_eq!(config.port, 9393);
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(
            config.users.get("test").and_then(|u| u.password.as_deref()),
            Some("password")
        );
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: MockServerConfig =
            serde_json::from_str(r#"{"port": 0, "users": {"alice": {"password": "s3cret"}}}"#)
                .unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(
            config.users.get("alice").and_then(|u| u.password.as_deref()),
            Some("s3cret")
        );
        assert!(config.users.get("alice").unwrap().public_key.is_none());
    }
}
