//! SFTP version 3 wire codec.
//!
//! Frames, decodes and encodes the subset of draft-ietf-secsh-filexfer-02
//! that the mock emulates. Incoming packets become [`SftpRequest`] values
//! dispatched by the session; every reply is one of the fixed
//! [`SftpResponse`] primitives (status, handle, data, attributes, name
//! list). Both directions are implemented so tests can drive the server as
//! a raw-protocol client.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{Error, Result};

/// Protocol version the server negotiates.
pub const SFTP_VERSION: u32 = 3;

/// Regular-file bit of the `permissions` attribute (`S_IFREG`).
pub const S_IFREG: u32 = 0o100000;

// Packet type bytes.
const SSH_FXP_INIT: u8 = 1;
const SSH_FXP_VERSION: u8 = 2;
const SSH_FXP_OPEN: u8 = 3;
const SSH_FXP_CLOSE: u8 = 4;
const SSH_FXP_READ: u8 = 5;
const SSH_FXP_WRITE: u8 = 6;
const SSH_FXP_LSTAT: u8 = 7;
const SSH_FXP_FSTAT: u8 = 8;
const SSH_FXP_OPENDIR: u8 = 11;
const SSH_FXP_READDIR: u8 = 12;
const SSH_FXP_REMOVE: u8 = 13;
const SSH_FXP_REALPATH: u8 = 16;
const SSH_FXP_STAT: u8 = 17;
const SSH_FXP_RENAME: u8 = 18;
const SSH_FXP_STATUS: u8 = 101;
const SSH_FXP_HANDLE: u8 = 102;
const SSH_FXP_DATA: u8 = 103;
const SSH_FXP_NAME: u8 = 104;
const SSH_FXP_ATTRS: u8 = 105;

// Attribute presence flags.
const ATTR_SIZE: u32 = 0x0000_0001;
const ATTR_UIDGID: u32 = 0x0000_0002;
const ATTR_PERMISSIONS: u32 = 0x0000_0004;
const ATTR_ACMODTIME: u32 = 0x0000_0008;
const ATTR_EXTENDED: u32 = 0x8000_0000;

// ── Status codes ─────────────────────────────────────────────────────────────

/// Terminal status of a request.
///
/// `Eof` is normal completion of a read loop, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Eof,
    NoSuchFile,
    Failure,
    OpUnsupported,
}

impl StatusCode {
    pub fn to_wire(self) -> u32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Eof => 1,
            StatusCode::NoSuchFile => 2,
            StatusCode::Failure => 4,
            StatusCode::OpUnsupported => 8,
        }
    }

    pub fn from_wire(code: u32) -> Result<Self> {
        match code {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::Eof),
            2 => Ok(StatusCode::NoSuchFile),
            4 => Ok(StatusCode::Failure),
            8 => Ok(StatusCode::OpUnsupported),
            other => Err(Error::Protocol(format!("unknown status code {other}"))),
        }
    }
}

// ── File attributes ──────────────────────────────────────────────────────────

/// SFTP v3 file attributes as the mock tracks them.
///
/// All fields are concrete: the virtual filesystem always knows every
/// attribute, so encoding always sets the size, uid/gid, permissions and
/// timestamp flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttrs {
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub permissions: u32,
    pub atime: u32,
    pub mtime: u32,
}

impl FileAttrs {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(ATTR_SIZE | ATTR_UIDGID | ATTR_PERMISSIONS | ATTR_ACMODTIME);
        buf.put_u64(self.size);
        buf.put_u32(self.uid);
        buf.put_u32(self.gid);
        buf.put_u32(self.permissions);
        buf.put_u32(self.atime);
        buf.put_u32(self.mtime);
    }

    pub fn decode(buf: &mut &[u8]) -> Result<Self> {
        let flags = get_u32(buf)?;
        let mut attrs = FileAttrs::default();
        if flags & ATTR_SIZE != 0 {
            attrs.size = get_u64(buf)?;
        }
        if flags & ATTR_UIDGID != 0 {
            attrs.uid = get_u32(buf)?;
            attrs.gid = get_u32(buf)?;
        }
        if flags & ATTR_PERMISSIONS != 0 {
            attrs.permissions = get_u32(buf)?;
        }
        if flags & ATTR_ACMODTIME != 0 {
            attrs.atime = get_u32(buf)?;
            attrs.mtime = get_u32(buf)?;
        }
        if flags & ATTR_EXTENDED != 0 {
            let count = get_u32(buf)?;
            for _ in 0..count {
                let _type = get_bytes(buf)?;
                let _data = get_bytes(buf)?;
            }
        }
        Ok(attrs)
    }
}

// ── Primitive readers / writers ──────────────────────────────────────────────

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.is_empty() {
        return Err(Error::Protocol("packet truncated reading u8".into()));
    }
    let value = buf[0];
    *buf = &buf[1..];
    Ok(value)
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.len() < 4 {
        return Err(Error::Protocol("packet truncated reading u32".into()));
    }
    let value = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(value)
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.len() < 8 {
        return Err(Error::Protocol("packet truncated reading u64".into()));
    }
    let value = u64::from_be_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ]);
    *buf = &buf[8..];
    Ok(value)
}

fn get_bytes(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let len = get_u32(buf)? as usize;
    if buf.len() < len {
        return Err(Error::Protocol("packet truncated reading string".into()));
    }
    let value = buf[..len].to_vec();
    *buf = &buf[len..];
    Ok(value)
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    String::from_utf8(get_bytes(buf)?)
        .map_err(|_| Error::Protocol("string field is not valid UTF-8".into()))
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

/// Prefix a packet body with its length.
fn frame(body: BytesMut) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

// ── Frame reassembly ─────────────────────────────────────────────────────────

/// Reassembles length-prefixed SFTP packets from an SSH channel byte stream.
///
/// One `data` event on the channel may carry a partial packet or several
/// packets back to back; callers push raw bytes and drain whole frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete packet body (length prefix stripped), if buffered.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if self.buf.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if self.buf.len() < 4 + len {
            return None;
        }
        self.buf.advance(4);
        Some(self.buf.split_to(len).freeze())
    }
}

// ── Requests ─────────────────────────────────────────────────────────────────

/// One decoded SFTP request.
///
/// A closed enum so the dispatcher's match is exhaustive; message types the
/// mock does not emulate (mkdir, rmdir, setstat, symlink, ...) decode to
/// [`SftpRequest::Unsupported`] and are answered with `OpUnsupported`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SftpRequest {
    Init { version: u32 },
    Open { id: u32, filename: String, pflags: u32, attrs: FileAttrs },
    Close { id: u32, handle: Vec<u8> },
    Read { id: u32, handle: Vec<u8>, offset: u64, len: u32 },
    Write { id: u32, handle: Vec<u8>, offset: u64, data: Vec<u8> },
    Lstat { id: u32, path: String },
    Fstat { id: u32, handle: Vec<u8> },
    Stat { id: u32, path: String },
    Opendir { id: u32, path: String },
    Readdir { id: u32, handle: Vec<u8> },
    Remove { id: u32, path: String },
    Rename { id: u32, old_path: String, new_path: String },
    Realpath { id: u32, path: String },
    Unsupported { id: u32, packet_type: u8 },
}

impl SftpRequest {
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut buf = frame;
        let packet_type = get_u8(&mut buf)?;
        match packet_type {
            SSH_FXP_INIT => Ok(SftpRequest::Init {
                version: get_u32(&mut buf)?,
            }),
            SSH_FXP_OPEN => Ok(SftpRequest::Open {
                id: get_u32(&mut buf)?,
                filename: get_string(&mut buf)?,
                pflags: get_u32(&mut buf)?,
                attrs: FileAttrs::decode(&mut buf)?,
            }),
            SSH_FXP_CLOSE => Ok(SftpRequest::Close {
                id: get_u32(&mut buf)?,
                handle: get_bytes(&mut buf)?,
            }),
            SSH_FXP_READ => Ok(SftpRequest::Read {
                id: get_u32(&mut buf)?,
                handle: get_bytes(&mut buf)?,
                offset: get_u64(&mut buf)?,
                len: get_u32(&mut buf)?,
            }),
            SSH_FXP_WRITE => Ok(SftpRequest::Write {
                id: get_u32(&mut buf)?,
                handle: get_bytes(&mut buf)?,
                offset: get_u64(&mut buf)?,
                data: get_bytes(&mut buf)?,
            }),
            SSH_FXP_LSTAT => Ok(SftpRequest::Lstat {
                id: get_u32(&mut buf)?,
                path: get_string(&mut buf)?,
            }),
            SSH_FXP_FSTAT => Ok(SftpRequest::Fstat {
                id: get_u32(&mut buf)?,
                handle: get_bytes(&mut buf)?,
            }),
            SSH_FXP_STAT => Ok(SftpRequest::Stat {
                id: get_u32(&mut buf)?,
                path: get_string(&mut buf)?,
            }),
            SSH_FXP_OPENDIR => Ok(SftpRequest::Opendir {
                id: get_u32(&mut buf)?,
                path: get_string(&mut buf)?,
            }),
            SSH_FXP_READDIR => Ok(SftpRequest::Readdir {
                id: get_u32(&mut buf)?,
                handle: get_bytes(&mut buf)?,
            }),
            SSH_FXP_REMOVE => Ok(SftpRequest::Remove {
                id: get_u32(&mut buf)?,
                path: get_string(&mut buf)?,
            }),
            SSH_FXP_RENAME => Ok(SftpRequest::Rename {
                id: get_u32(&mut buf)?,
                old_path: get_string(&mut buf)?,
                new_path: get_string(&mut buf)?,
            }),
            SSH_FXP_REALPATH => Ok(SftpRequest::Realpath {
                id: get_u32(&mut buf)?,
                path: get_string(&mut buf)?,
            }),
            other => Ok(SftpRequest::Unsupported {
                id: get_u32(&mut buf).unwrap_or(0),
                packet_type: other,
            }),
        }
    }

    /// Encode as a length-prefixed packet (the client direction; used by
    /// tests that speak the raw protocol at the server).
    pub fn encode(&self) -> Vec<u8> {
        let mut body = BytesMut::new();
        match self {
            SftpRequest::Init { version } => {
                body.put_u8(SSH_FXP_INIT);
                body.put_u32(*version);
            }
            SftpRequest::Open { id, filename, pflags, attrs } => {
                body.put_u8(SSH_FXP_OPEN);
                body.put_u32(*id);
                put_string(&mut body, filename);
                body.put_u32(*pflags);
                attrs.encode(&mut body);
            }
            SftpRequest::Close { id, handle } => {
                body.put_u8(SSH_FXP_CLOSE);
                body.put_u32(*id);
                put_bytes(&mut body, handle);
            }
            SftpRequest::Read { id, handle, offset, len } => {
                body.put_u8(SSH_FXP_READ);
                body.put_u32(*id);
                put_bytes(&mut body, handle);
                body.put_u64(*offset);
                body.put_u32(*len);
            }
            SftpRequest::Write { id, handle, offset, data } => {
                body.put_u8(SSH_FXP_WRITE);
                body.put_u32(*id);
                put_bytes(&mut body, handle);
                body.put_u64(*offset);
                put_bytes(&mut body, data);
            }
            SftpRequest::Lstat { id, path } => {
                body.put_u8(SSH_FXP_LSTAT);
                body.put_u32(*id);
                put_string(&mut body, path);
            }
            SftpRequest::Fstat { id, handle } => {
                body.put_u8(SSH_FXP_FSTAT);
                body.put_u32(*id);
                put_bytes(&mut body, handle);
            }
            SftpRequest::Stat { id, path } => {
                body.put_u8(SSH_FXP_STAT);
                body.put_u32(*id);
                put_string(&mut body, path);
            }
            SftpRequest::Opendir { id, path } => {
                body.put_u8(SSH_FXP_OPENDIR);
                body.put_u32(*id);
                put_string(&mut body, path);
            }
            SftpRequest::Readdir { id, handle } => {
                body.put_u8(SSH_FXP_READDIR);
                body.put_u32(*id);
                put_bytes(&mut body, handle);
            }
            SftpRequest::Remove { id, path } => {
                body.put_u8(SSH_FXP_REMOVE);
                body.put_u32(*id);
                put_string(&mut body, path);
            }
            SftpRequest::Rename { id, old_path, new_path } => {
                body.put_u8(SSH_FXP_RENAME);
                body.put_u32(*id);
                put_string(&mut body, old_path);
                put_string(&mut body, new_path);
            }
            SftpRequest::Realpath { id, path } => {
                body.put_u8(SSH_FXP_REALPATH);
                body.put_u32(*id);
                put_string(&mut body, path);
            }
            SftpRequest::Unsupported { id, packet_type } => {
                body.put_u8(*packet_type);
                body.put_u32(*id);
            }
        }
        frame(body)
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

/// One entry of a `SSH_FXP_NAME` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub filename: String,
    pub longname: String,
    pub attrs: FileAttrs,
}

/// The fixed set of response primitives a handler may emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SftpResponse {
    Version { version: u32 },
    Status { id: u32, code: StatusCode, message: String },
    Handle { id: u32, handle: Vec<u8> },
    Data { id: u32, data: Vec<u8> },
    Attrs { id: u32, attrs: FileAttrs },
    Name { id: u32, entries: Vec<NameEntry> },
}

impl SftpResponse {
    pub fn status(id: u32, code: StatusCode, message: impl Into<String>) -> Self {
        SftpResponse::Status {
            id,
            code,
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = BytesMut::new();
        match self {
            SftpResponse::Version { version } => {
                body.put_u8(SSH_FXP_VERSION);
                body.put_u32(*version);
            }
            SftpResponse::Status { id, code, message } => {
                body.put_u8(SSH_FXP_STATUS);
                body.put_u32(*id);
                body.put_u32(code.to_wire());
                put_string(&mut body, message);
                put_string(&mut body, "en");
            }
            SftpResponse::Handle { id, handle } => {
                body.put_u8(SSH_FXP_HANDLE);
                body.put_u32(*id);
                put_bytes(&mut body, handle);
            }
            SftpResponse::Data { id, data } => {
                body.put_u8(SSH_FXP_DATA);
                body.put_u32(*id);
                put_bytes(&mut body, data);
            }
            SftpResponse::Attrs { id, attrs } => {
                body.put_u8(SSH_FXP_ATTRS);
                body.put_u32(*id);
                attrs.encode(&mut body);
            }
            SftpResponse::Name { id, entries } => {
                body.put_u8(SSH_FXP_NAME);
                body.put_u32(*id);
                body.put_u32(entries.len() as u32);
                for entry in entries {
                    put_string(&mut body, &entry.filename);
                    put_string(&mut body, &entry.longname);
                    entry.attrs.encode(&mut body);
                }
            }
        }
        frame(body)
    }

    /// Decode a server reply (the client direction; used by tests).
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut buf = frame;
        let packet_type = get_u8(&mut buf)?;
        match packet_type {
            SSH_FXP_VERSION => Ok(SftpResponse::Version {
                version: get_u32(&mut buf)?,
            }),
            SSH_FXP_STATUS => Ok(SftpResponse::Status {
                id: get_u32(&mut buf)?,
                code: StatusCode::from_wire(get_u32(&mut buf)?)?,
                message: get_string(&mut buf)?,
            }),
            SSH_FXP_HANDLE => Ok(SftpResponse::Handle {
                id: get_u32(&mut buf)?,
                handle: get_bytes(&mut buf)?,
            }),
            SSH_FXP_DATA => Ok(SftpResponse::Data {
                id: get_u32(&mut buf)?,
                data: get_bytes(&mut buf)?,
            }),
            SSH_FXP_ATTRS => Ok(SftpResponse::Attrs {
                id: get_u32(&mut buf)?,
                attrs: FileAttrs::decode(&mut buf)?,
            }),
            SSH_FXP_NAME => {
                let id = get_u32(&mut buf)?;
                let count = get_u32(&mut buf)?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entries.push(NameEntry {
                        filename: get_string(&mut buf)?,
                        longname: get_string(&mut buf)?,
                        attrs: FileAttrs::decode(&mut buf)?,
                    });
                }
                Ok(SftpResponse::Name { id, entries })
            }
            other => Err(Error::Protocol(format!(
                "unexpected response packet type {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_frames_split_across_pushes() {
        let packet = SftpRequest::Stat {
            id: 7,
            path: "/test/file.txt".into(),
        }
        .encode();

        let mut frames = FrameBuffer::default();
        frames.push(&packet[..5]);
        assert!(frames.next_frame().is_none());
        frames.push(&packet[5..]);

        let frame = frames.next_frame().expect("complete frame");
        assert_eq!(
            SftpRequest::decode(&frame).unwrap(),
            SftpRequest::Stat {
                id: 7,
                path: "/test/file.txt".into()
            }
        );
        assert!(frames.next_frame().is_none());
    }

    #[test]
    fn drains_back_to_back_packets() {
        let mut stream = SftpRequest::Init { version: 3 }.encode();
        stream.extend(
            SftpRequest::Remove {
                id: 1,
                path: "/a".into(),
            }
            .encode(),
        );

        let mut frames = FrameBuffer::default();
        frames.push(&stream);
        assert!(frames.next_frame().is_some());
        assert!(frames.next_frame().is_some());
        assert!(frames.next_frame().is_none());
    }

    #[test]
    fn status_wire_format_is_exact() {
        let bytes = SftpResponse::status(3, StatusCode::Eof, "End of file").encode();
        // length prefix covers type byte + id + code + two strings
        let body_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(body_len, bytes.len() - 4);
        assert_eq!(bytes[4], SSH_FXP_STATUS);
        assert_eq!(&bytes[5..9], &3u32.to_be_bytes());
        assert_eq!(&bytes[9..13], &1u32.to_be_bytes());
    }

    #[test]
    fn attrs_decode_honors_partial_flags() {
        let mut buf = BytesMut::new();
        buf.put_u32(ATTR_SIZE | ATTR_PERMISSIONS);
        buf.put_u64(42);
        buf.put_u32(S_IFREG);
        let mut slice = &buf[..];
        let attrs = FileAttrs::decode(&mut slice).unwrap();
        assert_eq!(attrs.size, 42);
        assert_eq!(attrs.permissions, S_IFREG);
        assert_eq!(attrs.uid, 0);
        assert_eq!(attrs.mtime, 0);
    }

    #[test]
    fn unknown_request_type_decodes_as_unsupported() {
        // SSH_FXP_MKDIR (14) carries id + path.
        let mut body = BytesMut::new();
        body.put_u8(14);
        body.put_u32(9);
        put_string(&mut body, "/new-dir");
        let packet = frame(body);

        let mut frames = FrameBuffer::default();
        frames.push(&packet);
        let decoded = SftpRequest::decode(&frames.next_frame().unwrap()).unwrap();
        assert_eq!(
            decoded,
            SftpRequest::Unsupported {
                id: 9,
                packet_type: 14
            }
        );
    }

    #[test]
    fn truncated_packet_is_a_protocol_error() {
        let packet = SftpRequest::Stat {
            id: 1,
            path: "/x".into(),
        }
        .encode();
        // Drop the last byte of the path field.
        assert!(SftpRequest::decode(&packet[4..packet.len() - 1]).is_err());
    }
}
