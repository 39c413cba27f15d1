// ── Handle registry ───────────────────────────────────────────────────────────

use std::collections::HashMap;

/// Maps opaque wire handle tokens to the path owning them.
///
/// Kept as a direct map, updated on create/rename/remove, so READ and WRITE
/// resolve in O(1); a miss is reported to the client as a FAILURE status by
/// the dispatcher. Directory handles are not registered here — they carry
/// their path literally.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    by_token: HashMap<String, String>,
}

impl HandleRegistry {
    pub fn bind(&mut self, token: &str, path: &str) {
        self.by_token.insert(token.to_string(), path.to_string());
    }

    /// Path owning the given wire handle, if any. Handle tokens are UUID
    /// strings, so non-UTF-8 bytes can never resolve.
    pub fn resolve(&self, token: &[u8]) -> Option<&str> {
        let token = std::str::from_utf8(token).ok()?;
        self.by_token.get(token).map(String::as_str)
    }

    /// Re-point a handle after its entry moved to a new path.
    pub fn retarget(&mut self, token: &str, new_path: &str) {
        if let Some(path) = self.by_token.get_mut(token) {
            *path = new_path.to_string();
        }
    }

    /// Drop every handle pointing at `path` (entry removed).
    pub fn unbind_path(&mut self, path: &str) {
        self.by_token.retain(|_, target| target != path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_bound_tokens_and_misses_unknown_ones() {
        let mut registry = HandleRegistry::default();
        registry.bind("token-1", "/a");
        assert_eq!(registry.resolve(b"token-1"), Some("/a"));
        assert_eq!(registry.resolve(b"token-2"), None);
        assert_eq!(registry.resolve(&[0xff, 0xfe]), None);
    }

    #[test]
    fn retarget_follows_a_rename() {
        let mut registry = HandleRegistry::default();
        registry.bind("token-1", "/old");
        registry.retarget("token-1", "/new");
        assert_eq!(registry.resolve(b"token-1"), Some("/new"));
    }

    #[test]
    fn unbind_path_clears_all_handles_for_that_path() {
        let mut registry = HandleRegistry::default();
        registry.bind("token-1", "/f");
        registry.bind("token-2", "/other");
        registry.unbind_path("/f");
        assert_eq!(registry.resolve(b"token-1"), None);
        assert_eq!(registry.resolve(b"token-2"), Some("/other"));
    }
}
