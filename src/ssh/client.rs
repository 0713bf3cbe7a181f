//! SSH client: handshake, authentication, and permissive host-key acceptance.

use std::borrow::Cow;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::key::{self, PrivateKeyWithHashAlg};
use russh::keys::PublicKey;
use russh::*;
use tracing::{debug, info};

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::session::SshSession;

/// Opens a single SSH connection and authenticates it. Consumed by `connect`.
pub struct SshClient {
    config: SshConfig,
}

impl SshClient {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Connect to the SSH server and return a ready-to-use session.
    ///
    /// The whole handshake+auth exchange is wrapped in the configured timeout;
    /// nothing here blocks past `config.timeout_secs`.
    pub async fn connect(self) -> Result<SshSession, SshError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("connecting to ssh server at {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::ConnectionFailed(format!("failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::ConnectionFailed("no address found".to_string()))?;

        // Fleet routers range from modern OpenWrt to decade-old firmware still
        // speaking SHA-1 key exchange and raw ssh-rsa host keys. Extend the
        // default preference lists rather than replace them, so modern
        // algorithms are still negotiated first wherever the far end supports
        // them. russh's crypto backend has no CBC or RC4 cipher support and no
        // DSA host key support, so `3des-cbc`/`aes-cbc`/`arcfour`/`ssh-dss`
        // cannot be added here.
        let mut preferred = Preferred::default();
        preferred.kex = Cow::Owned(
            preferred
                .kex
                .iter()
                .cloned()
                .chain([kex::DH_G14_SHA1, kex::DH_G1_SHA1, kex::DH_GEX_SHA1])
                .collect(),
        );
        preferred.key = Cow::Owned(preferred.key.iter().cloned().chain([key::SSH_RSA]).collect());

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            preferred,
            ..Default::default()
        };

        let handler = ClientHandler::new(self.config.host.clone(), self.config.port);

        let mut handle = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            client::connect(Arc::new(ssh_config), socket_addr, handler),
        )
        .await
        .map_err(|_| SshError::Timeout("connection timed out".to_string()))?
        .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

        debug!("ssh handshake completed");

        let authenticated = match &self.config.auth {
            AuthMethod::Password { password } => handle
                .authenticate_password(&self.config.username, password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
            AuthMethod::Key {
                key_data,
                passphrase,
            } => {
                let key = russh::keys::decode_secret_key(key_data, passphrase.as_deref())
                    .map_err(|e| SshError::KeyError(e.to_string()))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&self.config.username, key_with_hash)
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "authentication rejected by server".to_string(),
            ));
        }

        info!("ssh authentication successful for {}", addr);

        Ok(SshSession::new(handle))
    }
}

/// Client handler for russh callbacks.
///
/// Host-key verification is intentionally permissive: this is an unattended
/// fleet collector with no operator present to confirm a TOFU prompt, so any
/// presented key is accepted and nothing is persisted to disk.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!("accepting host key for {}:{} (no TOFU store)", self.host, self.port);
        Ok(true)
    }
}
