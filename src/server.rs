//! SSH transport and server lifecycle.
//!
//! Binds the listener, runs each accepted connection through russh, wires
//! the authentication callbacks to the policy in [`crate::auth`], and feeds
//! `sftp` subsystem channels through the wire codec into per-channel
//! [`SftpSession`] dispatchers. Every other session capability (shell,
//! exec, pty, signals, x11, agent forwarding, env, window changes, foreign
//! subsystems) is rejected with a channel failure.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::server::{Auth, Msg, Response, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty, Sig};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{self, AuthDecision};
use crate::config::{MockServerConfig, UserAuth};
use crate::errors::{Error, Result};
use crate::protocol::FrameBuffer;
use crate::session::{SftpSession, SharedFs, SharedFsRef};

/// A running mock server.
///
/// All connections share one virtual filesystem, so a second connection (or
/// a test assertion through [`MockSftpServer::filesystem`]) observes writes
/// made by the first.
pub struct MockSftpServer {
    local_addr: SocketAddr,
    fs: SharedFsRef,
    accept_task: JoinHandle<()>,
}

impl MockSftpServer {
    /// Bind and start serving. The ed25519 host key is generated fresh per
    /// server; pass port `0` to let the OS pick one.
    pub async fn spawn(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.hostname.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;

        let host_key = russh_keys::key::KeyPair::generate_ed25519()
            .ok_or_else(|| Error::Config("could not generate ed25519 host key".into()))?;
        let mut ssh_config = russh::server::Config::default();
        ssh_config.auth_rejection_time = std::time::Duration::from_secs(3);
        ssh_config.auth_rejection_time_initial = Some(std::time::Duration::ZERO);
        ssh_config.keys = vec![host_key];
        let ssh_config = Arc::new(ssh_config);

        let users = Arc::new(config.users);
        let fs: SharedFsRef = Arc::new(Mutex::new(SharedFs::default()));
        let loop_fs = fs.clone();

        info!("mock sftp server listening on {local_addr}");

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        debug!("client connected from {peer}");
                        let handler = ClientHandler::new(users.clone(), loop_fs.clone());
                        let ssh_config = ssh_config.clone();
                        tokio::spawn(async move {
                            match russh::server::run_stream(ssh_config, socket, handler).await {
                                Ok(session) => {
                                    if let Err(err) = session.await {
                                        debug!("ssh session ended with error: {err}");
                                    }
                                }
                                Err(err) => debug!("ssh handshake failed: {err}"),
                            }
                        });
                    }
                    Err(err) => {
                        warn!("accept failed: {err}");
                        break;
                    }
                }
            }
        });

        Ok(MockSftpServer {
            local_addr,
            fs,
            accept_task,
        })
    }

    /// Address the server is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The shared virtual filesystem, for direct test assertions.
    pub fn filesystem(&self) -> SharedFsRef {
        self.fs.clone()
    }

    /// Stop accepting connections. Completes only once the accept loop has
    /// actually stopped; in-memory state is dropped with the server.
    pub async fn close(self) -> Result<()> {
        debug!("close sftp server");
        self.accept_task.abort();
        match self.accept_task.await {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// ── Per-connection handler ───────────────────────────────────────────────────

/// SFTP state of one open channel.
struct SftpChannel {
    session: SftpSession,
    frames: FrameBuffer,
}

struct ClientHandler {
    users: Arc<HashMap<String, UserAuth>>,
    fs: SharedFsRef,
    channels: HashMap<ChannelId, SftpChannel>,
}

impl ClientHandler {
    fn new(users: Arc<HashMap<String, UserAuth>>, fs: SharedFsRef) -> Self {
        ClientHandler {
            users,
            fs,
            channels: HashMap::new(),
        }
    }

    async fn reject_capability(
        &mut self,
        capability: &str,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<()> {
        debug!("{capability} requested, not implemented");
        session.channel_failure(channel);
        Ok(())
    }
}

fn to_auth(decision: AuthDecision) -> Auth {
    match decision {
        AuthDecision::Accept => Auth::Accept,
        AuthDecision::Reject { alternatives } => Auth::Reject {
            proceed_with_methods: alternatives,
        },
    }
}

#[async_trait]
impl russh::server::Handler for ClientHandler {
    type Error = Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth> {
        debug!("client {user} tried to authenticate using none");
        Ok(to_auth(auth::check_none()))
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth> {
        debug!("client {user} tried to authenticate using password");
        Ok(to_auth(auth::check_password(&self.users, user, password)))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh_keys::key::PublicKey,
    ) -> Result<Auth> {
        debug!("client {user} tried to authenticate using publickey");
        Ok(to_auth(auth::check_public_key(
            &self.users,
            user,
            public_key,
        )))
    }

    async fn auth_keyboard_interactive(
        &mut self,
        user: &str,
        _submethods: &str,
        _response: Option<Response<'async_trait>>,
    ) -> Result<Auth> {
        debug!("client {user} tried to authenticate using keyboard-interactive");
        Ok(to_auth(auth::check_keyboard_interactive()))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool> {
        debug!("session started with client on channel {:?}", channel.id());
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<()> {
        if name == "sftp" {
            debug!("sftp session established with client");
            self.channels.insert(
                channel_id,
                SftpChannel {
                    session: SftpSession::new(self.fs.clone()),
                    frames: FrameBuffer::default(),
                },
            );
            session.channel_success(channel_id);
        } else {
            debug!("subsystem {name} requested, not implemented");
            session.channel_failure(channel_id);
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<()> {
        let Some(channel) = self.channels.get_mut(&channel_id) else {
            return Ok(());
        };
        channel.frames.push(data);
        while let Some(frame) = channel.frames.next_frame() {
            let reply = channel.session.handle_frame(&frame).await?;
            session.data(channel_id, CryptoVec::from(reply));
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel_id: ChannelId,
        _session: &mut Session,
    ) -> Result<()> {
        self.channels.remove(&channel_id);
        Ok(())
    }

    // ── Unsupported session capabilities ─────────────────────────────────────

    async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<()> {
        self.reject_capability("shell", channel, session).await
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        _data: &[u8],
        session: &mut Session,
    ) -> Result<()> {
        self.reject_capability("exec", channel, session).await
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<()> {
        self.reject_capability("pty", channel, session).await
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        _variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> Result<()> {
        self.reject_capability("env", channel, session).await
    }

    async fn signal(
        &mut self,
        channel: ChannelId,
        _signal: Sig,
        session: &mut Session,
    ) -> Result<()> {
        self.reject_capability("signal", channel, session).await
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        session: &mut Session,
    ) -> Result<()> {
        self.reject_capability("window-change", channel, session)
            .await
    }

    async fn x11_request(
        &mut self,
        channel: ChannelId,
        _single_connection: bool,
        _x11_auth_protocol: &str,
        _x11_auth_cookie: &str,
        _x11_screen_number: u32,
        session: &mut Session,
    ) -> Result<()> {
        self.reject_capability("x11", channel, session).await
    }

    async fn agent_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<bool> {
        self.reject_capability("auth-agent", channel, session)
            .await?;
        Ok(false)
    }
}
