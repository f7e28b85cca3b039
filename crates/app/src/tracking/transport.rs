//! Single-consumer WebSocket stream for landmark messages.
//!
//! A background thread accepts connections and hands them to the pipeline
//! thread over a channel; before each send the pipeline adopts the newest
//! handed-off connection, so a fresh consumer replaces a stale one instead
//! of queueing behind it. Sends are best-effort: a missing or vanished
//! consumer never disturbs the frame loop.

use std::{
    io,
    net::{TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;
use tracing::{debug, error, warn};
use tungstenite::{Message, WebSocket};

use crate::tracking::data::TrackingMessage;

/// Interval at which the accept thread re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("failed to bind landmark stream to port {port}")]
    PortUnavailable {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Observable connection state, used by logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransportState {
    Idle,
    Connected,
    Closed,
}

pub(crate) struct WsTransport {
    conn: Option<WebSocket<TcpStream>>,
    conn_rx: Receiver<WebSocket<TcpStream>>,
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<thread::JoinHandle<()>>,
    port: u16,
}

impl WsTransport {
    /// Bind the loopback listener and start accepting in the background.
    ///
    /// A bind failure is fatal to the caller; there is no retry on another
    /// port. Pass port 0 to let the OS pick; `local_port` reports the
    /// outcome.
    pub(crate) fn bind(port: u16) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|source| TransportError::PortUnavailable { port, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::PortUnavailable { port, source })?;
        let local_port = listener.local_addr().map(|addr| addr.port()).unwrap_or(port);

        let shutdown = Arc::new(AtomicBool::new(false));
        let (conn_tx, conn_rx) = unbounded();

        let accept_shutdown = shutdown.clone();
        let accept_handle = thread::Builder::new()
            .name("landmark-stream-accept".into())
            .spawn(move || accept_loop(listener, conn_tx, accept_shutdown))
            .map_err(|source| TransportError::PortUnavailable { port, source })?;

        debug!("landmark stream listening on 127.0.0.1:{local_port}");

        Ok(Self {
            conn: None,
            conn_rx,
            shutdown,
            accept_handle: Some(accept_handle),
            port: local_port,
        })
    }

    #[cfg(test)]
    pub(crate) fn local_port(&self) -> u16 {
        self.port
    }

    pub(crate) fn state(&self) -> TransportState {
        if self.shutdown.load(Ordering::SeqCst) {
            TransportState::Closed
        } else if self.conn.is_some() {
            TransportState::Connected
        } else {
            TransportState::Idle
        }
    }

    /// True once a consumer handshake has completed and been adopted.
    #[cfg(test)]
    pub(crate) fn poll_connected(&mut self) -> bool {
        self.adopt_newest_connection();
        self.conn.is_some()
    }

    /// Push one message to the connected consumer, if any.
    ///
    /// A send failure means the peer went away: the connection is dropped
    /// back to idle and the next accepted consumer takes its place.
    /// Nothing propagates to the caller.
    pub(crate) fn send(&mut self, message: &TrackingMessage<'_>) {
        self.adopt_newest_connection();

        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(err) => {
                error!("failed to serialize tracking message: {err}");
                return;
            }
        };

        if let Err(err) = conn.send(Message::text(json)) {
            warn!("consumer disconnected: {err}");
            self.conn = None;
        }
    }

    /// Stop accepting, close the live connection, release the listener.
    /// Safe to call more than once.
    pub(crate) fn close(&mut self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            debug!("landmark stream on port {} closing", self.port);
        }
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.close(None);
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }

    fn adopt_newest_connection(&mut self) {
        while let Ok(conn) = self.conn_rx.try_recv() {
            if let Some(mut previous) = self.conn.replace(conn) {
                debug!("replacing connected consumer with a newer one");
                let _ = previous.close(None);
            }
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_loop(
    listener: TcpListener,
    conn_tx: Sender<WebSocket<TcpStream>>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                // The listener is non-blocking so the shutdown flag stays
                // responsive; the accepted stream must block for the
                // handshake and subsequent writes.
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let _ = stream.set_nodelay(true);
                match tungstenite::accept(stream) {
                    Ok(conn) => {
                        debug!("consumer connected from {peer}");
                        if conn_tx.send(conn).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("WebSocket handshake with {peer} failed: {err}"),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                error!("landmark stream accept failed: {err}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use tungstenite::stream::MaybeTlsStream;

    use super::*;
    use crate::tracking::data::Landmark;

    fn connect_client(port: u16) -> WebSocket<MaybeTlsStream<TcpStream>> {
        let (client, _) =
            tungstenite::connect(format!("ws://127.0.0.1:{port}")).expect("client connect");
        client
    }

    fn wait_for_consumer(transport: &mut WsTransport) {
        for _ in 0..200 {
            if transport.poll_connected() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("consumer never connected");
    }

    fn message(landmarks: &[Landmark]) -> TrackingMessage<'_> {
        TrackingMessage { id: 1, landmarks }
    }

    #[test]
    fn send_without_consumer_is_a_noop() {
        let mut transport = WsTransport::bind(0).expect("bind");
        let landmarks = [Landmark { id: 0, x: 0.5, y: 0.5 }];
        transport.send(&message(&landmarks));
        assert_eq!(transport.state(), TransportState::Idle);
        transport.close();
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[test]
    fn bound_port_cannot_be_taken_twice() {
        let transport = WsTransport::bind(0).expect("bind");
        let err = WsTransport::bind(transport.local_port()).expect_err("second bind should fail");
        assert!(matches!(err, TransportError::PortUnavailable { .. }));
    }

    #[test]
    fn connected_consumer_receives_messages() {
        let mut transport = WsTransport::bind(0).expect("bind");
        let mut client = connect_client(transport.local_port());
        wait_for_consumer(&mut transport);

        let landmarks = [Landmark { id: 0, x: 0.5, y: 0.5 }];
        transport.send(&message(&landmarks));
        assert_eq!(transport.state(), TransportState::Connected);

        let text = client
            .read()
            .expect("client read")
            .into_text()
            .expect("text frame");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid JSON");
        assert_eq!(value["id"], 1);
        assert_eq!(value["landmarks"][0]["id"], 0);
        transport.close();
    }

    #[test]
    fn disconnect_resets_to_idle_without_failing() {
        let mut transport = WsTransport::bind(0).expect("bind");
        let client = connect_client(transport.local_port());
        wait_for_consumer(&mut transport);
        drop(client);

        let landmarks = [Landmark { id: 0, x: 0.1, y: 0.2 }];
        for _ in 0..20 {
            transport.send(&message(&landmarks));
            if transport.state() == TransportState::Idle {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(transport.state(), TransportState::Idle);

        // Later sends stay silent no-ops.
        transport.send(&message(&landmarks));
        assert_eq!(transport.state(), TransportState::Idle);
        transport.close();
    }

    #[test]
    fn newer_consumer_replaces_the_current_one() {
        let mut transport = WsTransport::bind(0).expect("bind");
        let _first = connect_client(transport.local_port());
        wait_for_consumer(&mut transport);

        let mut second = connect_client(transport.local_port());
        if let MaybeTlsStream::Plain(stream) = second.get_ref() {
            stream
                .set_read_timeout(Some(Duration::from_millis(50)))
                .expect("read timeout");
        }

        let landmarks = [Landmark { id: 0, x: 0.9, y: 0.9 }];
        let mut delivered = false;
        for _ in 0..100 {
            transport.send(&message(&landmarks));
            if matches!(second.read(), Ok(received) if received.is_text()) {
                delivered = true;
                break;
            }
        }
        assert!(delivered, "replacement consumer never received a message");
        transport.close();
    }

    #[test]
    fn close_is_idempotent() {
        let mut transport = WsTransport::bind(0).expect("bind");
        transport.close();
        transport.close();
        assert_eq!(transport.state(), TransportState::Closed);
    }
}
