// ── Virtual file store ────────────────────────────────────────────────────────
//
// The entire "remote filesystem" is this map. Entries exist only for paths a
// client has opened; there are no directory entries — a directory exists
// exactly when some stored path lies beneath it.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::protocol::{FileAttrs, S_IFREG};

/// One virtual file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path the entry was created under. Not rewritten on rename; the store
    /// key is authoritative, this field only feeds logs.
    pub path: String,
    pub content: Vec<u8>,
    pub attrs: FileAttrs,
    handle_id: String,
}

impl FileEntry {
    fn new(path: &str) -> Self {
        // SFTP v3 carries u32 timestamps; saturate instead of wrapping
        // silently past 2106.
        let now = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
        FileEntry {
            path: path.to_string(),
            content: Vec::new(),
            attrs: FileAttrs {
                size: 0,
                uid: 1,
                gid: 1,
                permissions: S_IFREG,
                atime: now,
                mtime: now,
            },
            handle_id: Uuid::new_v4().to_string(),
        }
    }

    /// Opaque wire handle for this entry, assigned once at creation and
    /// stable for the entry's lifetime (not per-open).
    pub fn handle_id(&self) -> &str {
        &self.handle_id
    }

    /// Splice `data` into the content at `offset`: bytes before the offset
    /// are preserved, the old tail is re-appended after the new data. This
    /// is insertion, not a fixed-width overwrite.
    pub fn splice(&mut self, offset: u64, data: &[u8]) {
        let at = (offset as usize).min(self.content.len());
        let tail = self.content.split_off(at);
        self.content.extend_from_slice(data);
        self.content.extend_from_slice(&tail);
        self.attrs.size = self.content.len() as u64;
    }

    /// `content[offset..offset+len]`, clamped to the available bytes. An
    /// offset at or past the end yields an empty slice.
    pub fn read_at(&self, offset: u64, len: u32) -> &[u8] {
        let start = (offset as usize).min(self.content.len());
        let end = start
            .saturating_add(len as usize)
            .min(self.content.len());
        &self.content[start..end]
    }
}

/// Path-keyed map of every virtual file. At most one entry per path.
#[derive(Debug, Default)]
pub struct VirtualFileStore {
    entries: HashMap<String, FileEntry>,
}

impl VirtualFileStore {
    pub fn new() -> Self {
        VirtualFileStore::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut FileEntry> {
        self.entries.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Entry at `path`, creating a fresh zero-length regular file if the
    /// path is unknown.
    pub fn open(&mut self, path: &str) -> &FileEntry {
        self.entries
            .entry(path.to_string())
            .or_insert_with(|| FileEntry::new(path))
    }

    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.entries.remove(path)
    }

    /// Re-key the entry at `old_path` under `new_path`. The old key stops
    /// resolving; content, attributes and handle id travel with the entry.
    /// Returns the moved entry's handle id so open handles can be
    /// re-pointed.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> Option<String> {
        let entry = self.entries.remove(old_path)?;
        let handle_id = entry.handle_id.clone();
        self.entries.insert(new_path.to_string(), entry);
        Some(handle_id)
    }

    /// Whether any stored path lies under `dir + "/"` — the mock's notion
    /// of "this directory exists".
    pub fn has_children(&self, dir: &str) -> bool {
        let prefix = format!("{dir}/");
        self.entries.keys().any(|path| path.starts_with(&prefix))
    }

    /// Stored paths exactly one segment below `dir`, with their attributes,
    /// sorted by path for deterministic listings.
    pub fn direct_children(&self, dir: &str) -> Vec<(String, FileAttrs)> {
        let prefix = format!("{dir}/");
        let mut children: Vec<(String, FileAttrs)> = self
            .entries
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(|(path, entry)| (path.clone(), entry.attrs))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_zero_length_regular_file() {
        let mut store = VirtualFileStore::new();
        let entry = store.open("/test/file.txt");
        assert_eq!(entry.attrs.size, 0);
        assert_eq!(entry.attrs.permissions & S_IFREG, S_IFREG);
        assert_eq!(entry.attrs.uid, 1);
        assert_eq!(entry.attrs.gid, 1);
        assert!(entry.content.is_empty());
        // Creation timestamps fit the wire's u32 range without wrapping.
        assert!(entry.attrs.atime > 0 && entry.attrs.atime < u32::MAX);
        assert_eq!(entry.attrs.atime, entry.attrs.mtime);
    }

    #[test]
    fn reopening_keeps_the_original_handle_id() {
        let mut store = VirtualFileStore::new();
        let first = store.open("/f").handle_id().to_string();
        let second = store.open("/f").handle_id().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_entries_get_distinct_handle_ids() {
        let mut store = VirtualFileStore::new();
        let a = store.open("/a").handle_id().to_string();
        let b = store.open("/b").handle_id().to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn splice_inserts_rather_than_overwrites() {
        let mut store = VirtualFileStore::new();
        store.open("/f");
        let entry = store.get_mut("/f").unwrap();
        entry.splice(0, b"AAAA");
        entry.splice(2, b"BB");
        assert_eq!(entry.content, b"AABBAA");
        assert_eq!(entry.attrs.size, 6);
    }

    #[test]
    fn read_at_clamps_to_content() {
        let mut store = VirtualFileStore::new();
        store.open("/f");
        let entry = store.get_mut("/f").unwrap();
        entry.splice(0, b"hello");
        assert_eq!(entry.read_at(0, 5), b"hello");
        assert_eq!(entry.read_at(1, 100), b"ello");
        assert_eq!(entry.read_at(5, 10), b"");
        assert_eq!(entry.read_at(99, 10), b"");
    }

    #[test]
    fn rename_rekeys_without_rewriting_the_path_field() {
        let mut store = VirtualFileStore::new();
        store.open("/old");
        store.get_mut("/old").unwrap().splice(0, b"payload");
        let handle = store.get("/old").unwrap().handle_id().to_string();

        let moved = store.rename("/old", "/new").unwrap();
        assert_eq!(moved, handle);
        assert!(store.get("/old").is_none());

        let entry = store.get("/new").unwrap();
        assert_eq!(entry.content, b"payload");
        assert_eq!(entry.path, "/old");
    }

    #[test]
    fn rename_of_unknown_path_is_a_noop() {
        let mut store = VirtualFileStore::new();
        assert!(store.rename("/missing", "/elsewhere").is_none());
        assert!(store.get("/elsewhere").is_none());
    }

    #[test]
    fn direct_children_excludes_deeper_descendants() {
        let mut store = VirtualFileStore::new();
        store.open("/dir/a.txt");
        store.open("/dir/b.txt");
        store.open("/dir/sub/c.txt");
        store.open("/other/d.txt");

        let children = store.direct_children("/dir");
        let names: Vec<&str> = children.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(names, vec!["/dir/a.txt", "/dir/b.txt"]);

        assert!(store.has_children("/dir"));
        assert!(store.has_children("/dir/sub"));
        assert!(!store.has_children("/nope"));
    }
}
