// ── Authentication policy ─────────────────────────────────────────────────────
//
// Pure policy over the configured per-user table; the transport handler in
// `server` maps the decision onto russh's Auth type. Signature verification
// for publickey attempts happens in the russh transport before these checks
// run — this layer decides key identity only.

use std::collections::HashMap;

use russh::MethodSet;
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use tracing::debug;

use crate::config::UserAuth;

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Accept,
    /// Rejected; `alternatives` lists the methods the client may still try,
    /// or `None` to reject with no hint.
    Reject { alternatives: Option<MethodSet> },
}

/// `none` never succeeds but advertises the methods that can.
pub fn check_none() -> AuthDecision {
    AuthDecision::Reject {
        alternatives: Some(MethodSet::PASSWORD | MethodSet::PUBLICKEY),
    }
}

/// Hostbased attempts are always accepted.
pub fn check_hostbased() -> AuthDecision {
    AuthDecision::Accept
}

/// Keyboard-interactive attempts are always accepted.
pub fn check_keyboard_interactive() -> AuthDecision {
    AuthDecision::Accept
}

/// Exact match against the configured per-user password.
pub fn check_password(
    users: &HashMap<String, UserAuth>,
    user: &str,
    password: &str,
) -> AuthDecision {
    match users.get(user).and_then(|u| u.password.as_deref()) {
        Some(configured) if configured == password => AuthDecision::Accept,
        _ => AuthDecision::Reject {
            alternatives: Some(MethodSet::PUBLICKEY),
        },
    }
}

/// Accept only if the configured OpenSSH public key parses and matches the
/// offered key's algorithm and wire bytes. Malformed or missing configured
/// keys reject with no advertised alternatives.
pub fn check_public_key(
    users: &HashMap<String, UserAuth>,
    user: &str,
    offered: &PublicKey,
) -> AuthDecision {
    let Some(configured) = users.get(user).and_then(|u| u.public_key.as_deref()) else {
        return AuthDecision::Reject { alternatives: None };
    };
    match parse_openssh_public_key(configured) {
        Ok(expected) => {
            let matches = expected.name() == offered.name()
                && expected.public_key_bytes() == offered.public_key_bytes();
            debug!("verify key for {user} ended up with result: {matches}");
            if matches {
                AuthDecision::Accept
            } else {
                AuthDecision::Reject { alternatives: None }
            }
        }
        Err(err) => {
            debug!("could not parse configured public key for {user}: {err}");
            AuthDecision::Reject { alternatives: None }
        }
    }
}

/// Parse a key in OpenSSH `<algo> <base64> [comment]` form; a bare base64
/// blob is accepted too.
fn parse_openssh_public_key(line: &str) -> Result<PublicKey, russh_keys::Error> {
    let mut fields = line.split_whitespace();
    let first = fields.next().unwrap_or("");
    let b64 = fields.next().unwrap_or(first);
    russh_keys::parse_public_key_base64(b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_keys::key::KeyPair;

    fn users_with_password(user: &str, password: &str) -> HashMap<String, UserAuth> {
        let mut users = HashMap::new();
        users.insert(
            user.to_string(),
            UserAuth {
                password: Some(password.to_string()),
                public_key: None,
            },
        );
        users
    }

    fn users_with_key(user: &str, key_line: &str) -> HashMap<String, UserAuth> {
        let mut users = HashMap::new();
        users.insert(
            user.to_string(),
            UserAuth {
                password: None,
                public_key: Some(key_line.to_string()),
            },
        );
        users
    }

    fn openssh_line(key: &KeyPair) -> String {
        format!("{} {}", key.name(), key.public_key_base64())
    }

    fn public_half(key: &KeyPair) -> PublicKey {
        russh_keys::parse_public_key_base64(&key.public_key_base64()).unwrap()
    }

    #[test]
    fn hostbased_and_keyboard_interactive_always_pass() {
        assert_eq!(check_hostbased(), AuthDecision::Accept);
        assert_eq!(check_keyboard_interactive(), AuthDecision::Accept);
    }

    #[test]
    fn none_rejects_advertising_password_and_publickey() {
        assert_eq!(
            check_none(),
            AuthDecision::Reject {
                alternatives: Some(MethodSet::PASSWORD | MethodSet::PUBLICKEY)
            }
        );
    }

    #[test]
    fn password_requires_exact_match() {
        let users = users_with_password("test", "test");
        assert_eq!(check_password(&users, "test", "test"), AuthDecision::Accept);
        assert_eq!(
            check_password(&users, "test", "wrong-password"),
            AuthDecision::Reject {
                alternatives: Some(MethodSet::PUBLICKEY)
            }
        );
        assert_eq!(
            check_password(&users, "unknown", "test"),
            AuthDecision::Reject {
                alternatives: Some(MethodSet::PUBLICKEY)
            }
        );
    }

    #[test]
    fn public_key_accepts_only_the_configured_key() {
        let key = KeyPair::generate_ed25519().unwrap();
        let users = users_with_key("test", &openssh_line(&key));
        assert_eq!(
            check_public_key(&users, "test", &public_half(&key)),
            AuthDecision::Accept
        );

        let other = KeyPair::generate_ed25519().unwrap();
        assert_eq!(
            check_public_key(&users, "test", &public_half(&other)),
            AuthDecision::Reject { alternatives: None }
        );
    }

    #[test]
    fn malformed_configured_key_rejects_outright() {
        let key = KeyPair::generate_ed25519().unwrap();
        let users = users_with_key("test", "ssh-ed25519 not-base64!!");
        assert_eq!(
            check_public_key(&users, "test", &public_half(&key)),
            AuthDecision::Reject { alternatives: None }
        );
    }

    #[test]
    fn user_without_configured_key_rejects_outright() {
        let key = KeyPair::generate_ed25519().unwrap();
        let users = users_with_password("test", "password");
        assert_eq!(
            check_public_key(&users, "test", &public_half(&key)),
            AuthDecision::Reject { alternatives: None }
        );
    }

    #[test]
    fn bare_base64_configured_key_is_accepted() {
        let key = KeyPair::generate_ed25519().unwrap();
        let users = users_with_key("test", &key.public_key_base64());
        assert_eq!(
            check_public_key(&users, "test", &public_half(&key)),
            AuthDecision::Accept
        );
    }
}
