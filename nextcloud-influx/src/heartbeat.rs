//! Liveness notifications for the process supervisor
//!
//! The reporter only sees the [`Heartbeat`] trait. Under systemd
//! (`Type=notify`) the [`SystemdNotifier`] forwards `STATUS=` and `READY=1`
//! datagrams to `$NOTIFY_SOCKET`; elsewhere [`NoopHeartbeat`] is used.

use tracing::{debug, warn};

pub trait Heartbeat: Send + Sync {
    /// Publish a free-form status line
    fn notify(&self, status: &str);
    /// Signal that the service is up
    fn ready(&self);
}

/// Heartbeat that does nothing (no supervisor)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHeartbeat;

impl Heartbeat for NoopHeartbeat {
    fn notify(&self, status: &str) {
        debug!("status: {}", status);
    }

    fn ready(&self) {}
}

/// Pick the systemd notifier when `$NOTIFY_SOCKET` is set, a no-op otherwise
pub fn from_env() -> Box<dyn Heartbeat> {
    match SystemdNotifier::from_env() {
        Some(notifier) => {
            debug!("Notifying systemd at {}", notifier.socket);
            Box::new(notifier)
        }
        None => Box::new(NoopHeartbeat),
    }
}

/// sd_notify(3) over a unix datagram socket
#[derive(Debug, Clone)]
pub struct SystemdNotifier {
    socket: String,
}

impl SystemdNotifier {
    pub fn from_env() -> Option<Self> {
        std::env::var("NOTIFY_SOCKET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    pub fn new(socket: impl Into<String>) -> Self {
        Self { socket: socket.into() }
    }

    fn send(&self, message: &str) {
        if let Err(e) = self.try_send(message) {
            warn!("Failed to notify systemd at {}: {}", self.socket, e);
        }
    }

    #[cfg(unix)]
    fn try_send(&self, message: &str) -> std::io::Result<()> {
        use std::os::unix::net::UnixDatagram;

        let sock = UnixDatagram::unbound()?;
        match self.socket.strip_prefix('@') {
            #[cfg(target_os = "linux")]
            Some(name) => {
                use std::os::linux::net::SocketAddrExt;
                use std::os::unix::net::SocketAddr;

                let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
                sock.send_to_addr(message.as_bytes(), &addr)?;
            }
            #[cfg(not(target_os = "linux"))]
            Some(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "abstract sockets are linux only",
                ));
            }
            None => {
                sock.send_to(message.as_bytes(), &self.socket)?;
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_send(&self, _message: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "sd_notify needs unix sockets",
        ))
    }
}

impl Heartbeat for SystemdNotifier {
    fn notify(&self, status: &str) {
        self.send(&format!("STATUS={status}"));
    }

    fn ready(&self) {
        self.send("READY=1");
    }
}
