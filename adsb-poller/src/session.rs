use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use ssh2::Session;
use thiserror::Error;
use crate::config::RemoteConfig;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("authentication rejected for {0}")]
    NotAuthenticated(String),
}

/// An established session that can run one command at a time.
pub trait RemoteShell {
    /// Run `command` and return its standard output.
    fn exec(&mut self, command: &str) -> Result<String, SessionError>;

    /// Tear the session down. Errors are logged, not returned.
    fn close(&mut self);
}

pub trait Connector {
    type Shell: RemoteShell;

    fn connect(&self) -> Result<Self::Shell, SessionError>;
}

pub struct SshConnector {
    settings: RemoteConfig,
}

impl SshConnector {
    pub fn new(settings: RemoteConfig) -> Self {
        Self { settings }
    }
}

impl Connector for SshConnector {
    type Shell = SshShell;

    fn connect(&self) -> Result<SshShell, SessionError> {
        let settings = &self.settings;
        let timeout = settings.timeout();

        let addr = (settings.hostname.as_str(), settings.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| SessionError::Resolve(settings.hostname.clone()))?;
        let tcp = TcpStream::connect_timeout(&addr, timeout)?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        // Bounds every blocking libssh2 call, including reads
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        session.handshake()?;

        match &settings.private_key {
            Some(key) => session.userauth_pubkey_file(
                &settings.username,
                None,
                key,
                settings.password.as_deref(),
            )?,
            None => session.userauth_password(
                &settings.username,
                settings.password.as_deref().unwrap_or_default(),
            )?,
        }
        if !session.authenticated() {
            return Err(SessionError::NotAuthenticated(settings.username.clone()));
        }

        tracing::info!("Connected to {}@{}:{}", settings.username, settings.hostname, settings.port);
        Ok(SshShell { session })
    }
}

pub struct SshShell {
    session: Session,
}

impl RemoteShell for SshShell {
    fn exec(&mut self, command: &str) -> Result<String, SessionError> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let mut output = Vec::new();
        channel.read_to_end(&mut output)?;
        channel.wait_close()?;

        // A missing log shows up as empty output, which the poller handles
        match channel.exit_status() {
            Ok(0) => {}
            Ok(code) => tracing::debug!("{:?} exited with {}", command, code),
            Err(e) => tracing::debug!("No exit status for {:?}: {}", command, e),
        }

        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    fn close(&mut self) {
        if let Err(e) = self.session.disconnect(None, "adsb-poller closing", None) {
            tracing::debug!("SSH disconnect failed: {}", e);
        }
    }
}
