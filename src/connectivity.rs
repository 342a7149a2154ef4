//! Connectivity probing for the offline-fallback policy.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Answers "is the network worth trying right now?".
///
/// The repository consults this once per trigger; a `false` answer routes
/// the request to the cache instead of a doomed network call.
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Probe that attempts a short TCP connect to the API host.
pub struct TcpProbe {
  host: String,
  port: u16,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
      timeout: Duration::from_millis(800),
    }
  }

  /// Probe against the HTTPS port of `host`.
  pub fn https(host: impl Into<String>) -> Self {
    Self::new(host, 443)
  }
}

impl Connectivity for TcpProbe {
  fn is_online(&self) -> bool {
    let addrs = match (self.host.as_str(), self.port).to_socket_addrs() {
      Ok(addrs) => addrs,
      Err(_) => return false,
    };

    for addr in addrs {
      if TcpStream::connect_timeout(&addr, self.timeout).is_ok() {
        return true;
      }
    }
    false
  }
}

/// Fixed answer, for tests and the `--offline` CLI override.
pub struct Fixed(pub bool);

impl Connectivity for Fixed {
  fn is_online(&self) -> bool {
    self.0
  }
}
