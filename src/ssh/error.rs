//! SSH error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("channel error: {0}")]
    ChannelError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("ssh protocol error: {0}")]
    ProtocolError(String),

    #[error("key error: {0}")]
    KeyError(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::KeyError(err.to_string())
    }
}
