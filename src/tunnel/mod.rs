//! Routing of backup traffic through SSH tunnels.
//!
//! The SSH transport itself lives outside this crate; it is consumed through
//! [`TunnelTransport`]. What this module owns is the routing decision and the
//! tunnel's lifetime: a [`RoutedTarget`] closes its tunnel exactly once when
//! dropped, however the run ends.

use derive_more::{Display, Error};

use crate::connection::{ConnectionDescriptor, TunnelSpec};

/// Why no usable tunnel endpoint could be provided.
#[derive(Debug, Display, Error)]
pub enum TunnelError {
    /// No transport is wired into this process at all.
    #[display("tunnel transport unavailable: {_0}")]
    Unavailable(#[error(ignore)] String),

    /// The transport failed to establish the forwarding session.
    #[display("opening the tunnel failed: {_0}")]
    Open(#[error(ignore)] String),
}

impl TunnelError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        TunnelError::Unavailable(message.into())
    }

    pub fn open(message: impl Into<String>) -> Self {
        TunnelError::Open(message.into())
    }
}

/// A live port-forwarding session.
pub trait TunnelHandle: Send {
    /// Local port the forward listens on.
    fn local_port(&self) -> u16;

    /// Terminates the session. Called exactly once, by [`RoutedTarget`].
    fn close(&mut self);
}

/// Opens SSH port forwards to a jump host. Implemented outside this crate.
pub trait TunnelTransport: Send + Sync {
    fn open(
        &self,
        spec: &TunnelSpec,
        target_host: &str,
        target_port: u16,
    ) -> Result<Box<dyn TunnelHandle>, TunnelError>;
}

/// Effective endpoint for one backup run, owning the tunnel behind it.
///
/// A target is exclusively owned by the run that routed it and must not be
/// reused across runs. Dropping it closes the tunnel, which also covers
/// panicking runs.
pub struct RoutedTarget {
    host: String,
    port: u16,
    tunnel: Option<Box<dyn TunnelHandle>>,
}

impl RoutedTarget {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }
}

impl Drop for RoutedTarget {
    fn drop(&mut self) {
        if let Some(mut handle) = self.tunnel.take() {
            handle.close();
            log::debug!(target: "tunnel", "closed tunnel on local port {}", self.port);
        }
    }
}

/// Decides whether the connection needs a tunnel and opens one if so.
///
/// Without a tunnel spec the connection's own endpoint comes back untouched.
/// With one, the transport forwards a local ephemeral port to the database
/// through the jump host and the effective endpoint becomes
/// `127.0.0.1:<local port>`. Opening is fatal to the run; there is no retry
/// here.
pub fn route_if_needed(
    transport: &dyn TunnelTransport,
    conn: &ConnectionDescriptor,
) -> Result<RoutedTarget, TunnelError> {
    let Some(spec) = &conn.tunnel else {
        return Ok(RoutedTarget {
            host: conn.host.clone(),
            port: conn.port,
            tunnel: None,
        });
    };

    log::debug!(
        target: "tunnel",
        "opening tunnel for connection {} via {}@{}:{}",
        conn.id,
        spec.username,
        spec.host,
        spec.port
    );
    let handle = transport.open(spec, &conn.host, conn.port)?;
    let port = handle.local_port();
    log::info!(
        target: "tunnel",
        "connection {} routed through 127.0.0.1:{port}",
        conn.id
    );

    Ok(RoutedTarget {
        host: "127.0.0.1".to_string(),
        port,
        tunnel: Some(handle),
    })
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    pub(crate) struct RecordingHandle {
        port: u16,
        closed: Arc<AtomicUsize>,
    }

    impl TunnelHandle for RecordingHandle {
        fn local_port(&self) -> u16 {
            self.port
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Transport double that hands out a fixed local port and counts opens
    /// and closes.
    pub(crate) struct RecordingTunnelTransport {
        pub local_port: u16,
        pub fail_open: bool,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    impl RecordingTunnelTransport {
        pub(crate) fn new(local_port: u16) -> Self {
            Self {
                local_port,
                fail_open: false,
                opened: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn failing() -> Self {
            let mut transport = Self::new(0);
            transport.fail_open = true;
            transport
        }

        pub(crate) fn open_count(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub(crate) fn close_count(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl TunnelTransport for RecordingTunnelTransport {
        fn open(
            &self,
            _spec: &TunnelSpec,
            _target_host: &str,
            _target_port: u16,
        ) -> Result<Box<dyn TunnelHandle>, TunnelError> {
            if self.fail_open {
                return Err(TunnelError::open("handshake refused"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingHandle {
                port: self.local_port,
                closed: Arc::clone(&self.closed),
            }))
        }
    }
}
