//! SFTP request dispatcher.
//!
//! One handler per operation kind; every request produces exactly one
//! terminal response. The dispatcher is transport-free: it consumes decoded
//! [`SftpRequest`] values and returns [`SftpResponse`] values, so the whole
//! state machine is testable without a socket.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::handles::HandleRegistry;
use crate::listing::{DirListings, ListingStep};
use crate::protocol::{
    FileAttrs, NameEntry, SftpRequest, SftpResponse, StatusCode, SFTP_VERSION,
};
use crate::vfs::VirtualFileStore;

/// Filesystem state shared by every connection of one mock server, so a
/// second connection (or a test assertion) observes the first one's writes.
#[derive(Debug, Default)]
pub struct SharedFs {
    pub store: VirtualFileStore,
    pub handles: HandleRegistry,
}

pub type SharedFsRef = Arc<Mutex<SharedFs>>;

/// One SFTP session: the shared filesystem plus this session's directory
/// cursors. The SSH channel delivers requests strictly in order, so no
/// per-request locking beyond the shared-store mutex is needed.
pub struct SftpSession {
    fs: SharedFsRef,
    listings: DirListings,
}

impl SftpSession {
    pub fn new(fs: SharedFsRef) -> Self {
        SftpSession {
            fs,
            listings: DirListings::default(),
        }
    }

    /// Decode one framed packet, dispatch it, and encode the reply.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let request = SftpRequest::decode(frame)?;
        Ok(self.handle_request(request).await.encode())
    }

    /// Route one decoded request to its handler.
    pub async fn handle_request(&mut self, request: SftpRequest) -> SftpResponse {
        match request {
            SftpRequest::Init { version } => {
                debug!("client init, version {version}");
                SftpResponse::Version {
                    version: SFTP_VERSION,
                }
            }
            SftpRequest::Open { id, filename, .. } => self.open(id, &filename).await,
            SftpRequest::Close { id, .. } => {
                // Acknowledge only: entries persist after close so tests can
                // stat or reopen them.
                debug!("closing file");
                SftpResponse::status(id, StatusCode::Ok, "Success")
            }
            SftpRequest::Read { id, handle, offset, len } => {
                self.read(id, &handle, offset, len).await
            }
            SftpRequest::Write { id, handle, offset, data } => {
                self.write(id, &handle, offset, &data).await
            }
            SftpRequest::Lstat { id, path }
            | SftpRequest::Stat { id, path } => self.stat(id, &path).await,
            SftpRequest::Fstat { id, handle } => {
                // Faithful quirk: the handle bytes are resolved as a path
                // string, exactly like the path-based stat family.
                let path = String::from_utf8_lossy(&handle).into_owned();
                self.stat(id, &path).await
            }
            SftpRequest::Remove { id, path } => self.remove(id, &path).await,
            SftpRequest::Rename { id, old_path, new_path } => {
                self.rename(id, &old_path, &new_path).await
            }
            SftpRequest::Opendir { id, path } => self.opendir(id, &path).await,
            SftpRequest::Readdir { id, handle } => self.readdir(id, &handle).await,
            SftpRequest::Realpath { id, path } => self.realpath(id, &path),
            SftpRequest::Unsupported { id, packet_type } => {
                warn!("unsupported request type {packet_type}");
                SftpResponse::status(id, StatusCode::OpUnsupported, "Operation unsupported")
            }
        }
    }

    // ── Per-operation handlers ───────────────────────────────────────────────

    async fn stat(&self, id: u32, path: &str) -> SftpResponse {
        let fs = self.fs.lock().await;
        match fs.store.get(path) {
            Some(entry) => SftpResponse::Attrs {
                id,
                attrs: entry.attrs,
            },
            None => SftpResponse::status(id, StatusCode::NoSuchFile, "File could not be found"),
        }
    }

    async fn open(&self, id: u32, filename: &str) -> SftpResponse {
        let mut fs = self.fs.lock().await;
        if !fs.store.contains(filename) {
            debug!("create handle for new file {filename}");
        }
        let SharedFs { store, handles } = &mut *fs;
        let token = store.open(filename).handle_id().to_string();
        handles.bind(&token, filename);
        debug!("opened file handle {token}");
        SftpResponse::Handle {
            id,
            handle: token.into_bytes(),
        }
    }

    async fn read(&self, id: u32, handle: &[u8], offset: u64, len: u32) -> SftpResponse {
        let fs = self.fs.lock().await;
        let entry = fs
            .handles
            .resolve(handle)
            .and_then(|path| fs.store.get(path));
        let Some(entry) = entry else {
            return SftpResponse::status(id, StatusCode::Failure, "Invalid handle");
        };
        let chunk = entry.read_at(offset, len);
        if chunk.is_empty() {
            return SftpResponse::status(id, StatusCode::Eof, "End of file");
        }
        debug!("reading {} bytes from file {}", chunk.len(), entry.path);
        SftpResponse::Data {
            id,
            data: chunk.to_vec(),
        }
    }

    async fn write(&self, id: u32, handle: &[u8], offset: u64, data: &[u8]) -> SftpResponse {
        let mut fs = self.fs.lock().await;
        let SharedFs { store, handles } = &mut *fs;
        let entry = handles.resolve(handle).and_then(|path| store.get_mut(path));
        let Some(entry) = entry else {
            return SftpResponse::status(id, StatusCode::Failure, "Invalid handle");
        };
        entry.splice(offset, data);
        debug!("wrote {} bytes at offset {offset}", data.len());
        SftpResponse::status(id, StatusCode::Ok, "Success")
    }

    async fn remove(&self, id: u32, path: &str) -> SftpResponse {
        // Unconditional: removing a never-created path is still OK.
        let mut fs = self.fs.lock().await;
        fs.store.remove(path);
        fs.handles.unbind_path(path);
        SftpResponse::status(id, StatusCode::Ok, "Success")
    }

    async fn rename(&self, id: u32, old_path: &str, new_path: &str) -> SftpResponse {
        let mut fs = self.fs.lock().await;
        let SharedFs { store, handles } = &mut *fs;
        if let Some(token) = store.rename(old_path, new_path) {
            handles.retarget(&token, new_path);
        }
        SftpResponse::status(id, StatusCode::Ok, "Success")
    }

    async fn opendir(&mut self, id: u32, path: &str) -> SftpResponse {
        debug!("client tries to open the directory {path}");
        let fs = self.fs.lock().await;
        if fs.store.has_children(path) {
            self.listings.open(path);
            SftpResponse::Handle {
                id,
                handle: path.as_bytes().to_vec(),
            }
        } else {
            SftpResponse::status(id, StatusCode::NoSuchFile, "File could not be found")
        }
    }

    async fn readdir(&mut self, id: u32, handle: &[u8]) -> SftpResponse {
        // Directory handles carry the literal path.
        let path = String::from_utf8_lossy(handle).into_owned();
        let children = {
            let fs = self.fs.lock().await;
            fs.store.direct_children(&path)
        };
        match self.listings.advance(&path, children) {
            ListingStep::Batch(entries) => {
                debug!("client listing {path}: {} entries", entries.len());
                SftpResponse::Name {
                    id,
                    entries: entries
                        .into_iter()
                        // Displayed name is the full stored path, not the
                        // relative segment.
                        .map(|(path, attrs)| NameEntry {
                            filename: path.clone(),
                            longname: path,
                            attrs,
                        })
                        .collect(),
                }
            }
            ListingStep::End => SftpResponse::status(id, StatusCode::Eof, "End of file"),
        }
    }

    fn realpath(&self, id: u32, path: &str) -> SftpResponse {
        let resolved = if path.is_empty() || path == "." {
            "/".to_string()
        } else {
            path.to_string()
        };
        SftpResponse::Name {
            id,
            entries: vec![NameEntry {
                filename: resolved.clone(),
                longname: resolved,
                attrs: FileAttrs::default(),
            }],
        }
    }
}
