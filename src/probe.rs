//! Single bounded-timeout TCP probe. The one leaf every higher layer
//! (fingerprinter, scanner, collector) calls to ask "is something listening
//! there".

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

/// Timeout tiers named in the scan design; callers may also pass an arbitrary
/// duration when these don't fit.
pub mod timeouts {
    use std::time::Duration;

    pub const ULTRA: Duration = Duration::from_millis(120);
    pub const QUICK: Duration = Duration::from_millis(300);
    pub const EXTENDED: Duration = Duration::from_millis(1200);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open,
    Closed,
    Error,
}

/// A small slack added on top of the caller's timeout so the probe's own
/// bookkeeping never makes it run over budget.
const SAFETY_SLACK: Duration = Duration::from_millis(50);

/// Attempt a TCP connect to `ip:port`, bounded by `timeout`. Guarantees the
/// socket is torn down before returning, in any outcome.
pub async fn probe_tcp(ip: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let addr_str = format!("{}:{}", ip, port);
    let addr: SocketAddr = match addr_str.parse() {
        Ok(a) => a,
        Err(_) => return ProbeOutcome::Error,
    };

    let deadline = timeout + SAFETY_SLACK;
    match tokio::time::timeout(deadline, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            ProbeOutcome::Open
        }
        Ok(Err(_)) => ProbeOutcome::Closed,
        Err(_) => ProbeOutcome::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_port_on_loopback_is_closed() {
        // Port 1 is reserved and essentially never has a listener bound to it
        // in a test sandbox, so the connect should be actively refused.
        let outcome = probe_tcp("127.0.0.1", 1, Duration::from_millis(200)).await;
        assert_eq!(outcome, ProbeOutcome::Closed);
    }

    #[tokio::test]
    async fn bad_address_is_error() {
        let outcome = probe_tcp("not-an-ip", 22, Duration::from_millis(200)).await;
        assert_eq!(outcome, ProbeOutcome::Error);
    }

    #[tokio::test]
    async fn open_port_is_detected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let outcome = probe_tcp("127.0.0.1", port, Duration::from_millis(500)).await;
        assert_eq!(outcome, ProbeOutcome::Open);
    }
}
