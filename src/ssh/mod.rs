//! SSH module: connection, authentication, and a persistent-shell session
//! abstraction built on `russh`.

mod client;
mod config;
mod error;
mod session;

pub use client::{ClientHandler, SshClient};
pub use config::{AuthMethod, SshConfig};
pub use error::SshError;
pub use session::{CommandOutput, SshSession};
