//! Session transport and request queue.
//!
//! One TCP connection to a base station, driven by a single reader task that
//! appends socket bytes (decrypting once a session cipher is installed) into
//! a contiguous receive buffer. Exchanges are serialised by a fair async
//! mutex: a caller acquires a short-lived [`SessionHandle`] and owns the
//! socket for one request/response conversation; the next waiter runs when
//! the handle drops.
//!
//! While no exchange is active and nothing is mid-read, the transport
//! inspects the buffer head for unsolicited traffic: a `"XE"` prefix starts
//! a monitor frame (8-byte header, CFL-encoded body) which is published to
//! subscribers; anything else is logged and drained, since no queued reader
//! will ever consume it.
//!
//! # Ordering
//!
//! Within a handle, bytes are sent in call order and received in arrival
//! order. Across handles, whole exchanges are serialised. Monitor events may
//! be delivered whenever the queue is idle; no ordering is promised between
//! them and synchronous replies.
//!
//! # Cancellation
//!
//! Peer disconnect fails the in-flight read, discards the receive buffer,
//! and rejects queued waiters as they are reached. There is no
//! cross-exchange cancellation; callers wanting to abort must close the
//! session.

use std::{
    sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard},
    time::Duration,
};

use acp_crypto::{CipherHalf, EncryptionContext};
use acp_proto::{
    CflValue, ELEMENT_HEADER_SIZE, ElementHeader, HEADER_SIZE, Message, Property, cflbinary,
    property::FLAG_ERROR,
};
use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, MutexGuard, Notify, broadcast},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, warn};

use crate::error::{ClientError, Result, TransportError};

/// Prefix announcing an unsolicited monitor frame.
const MONITOR_PREFIX: [u8; 2] = *b"XE";

/// Monitor frame header: 4-byte magic plus a u32 big-endian body length.
const MONITOR_HEADER_SIZE: usize = 8;

/// Capacity of the monitor broadcast channel. Slow subscribers lag rather
/// than stall the reader.
const MONITOR_CHANNEL_CAPACITY: usize = 64;

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for `receive` to produce the requested bytes.
    pub read_timeout: Duration,
    /// Deadline for the TCP connect.
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { read_timeout: Duration::from_secs(10), connect_timeout: Duration::from_secs(10) }
    }
}

/// Unsolicited server-pushed event.
#[derive(Debug, Clone)]
pub struct MonitorEvent {
    /// Decoded CFL payload of the frame.
    pub payload: CflValue,
}

/// Receive-side state. Guarded by a std mutex that is never held across an
/// await point; the reader task and handle readers take it briefly.
struct RxState {
    buf: BytesMut,
    /// Depth of in-flight `receive` calls; the unsolicited dispatcher stays
    /// off while this is non-zero.
    reading: usize,
    /// Live exchange handles; the dispatcher only runs at zero.
    exchanges: usize,
    connected: bool,
    inbound: Option<CipherHalf>,
}

/// Send-side state, behind an async mutex so writes order outbound bytes
/// and the cipher counter together.
struct TxState {
    writer: Option<OwnedWriteHalf>,
    outbound: Option<CipherHalf>,
}

struct Shared {
    rx: StdMutex<RxState>,
    /// Signalled on every buffer append and on disconnect.
    data: Notify,
    tx: Mutex<TxState>,
    /// The request queue: a fair FIFO of exchange owners.
    queue: Mutex<()>,
    monitor: broadcast::Sender<MonitorEvent>,
    config: SessionConfig,
}

/// Lock the receive state, shrugging off poisoning (a panicked reader leaves
/// plain data that is still safe to observe).
fn lock_rx(shared: &Shared) -> StdMutexGuard<'_, RxState> {
    match shared.rx.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn disconnect(shared: &Shared) {
    let mut rx = lock_rx(shared);
    rx.connected = false;
    rx.buf.clear();
    drop(rx);
    shared.data.notify_waiters();
}

/// Pump socket bytes into the receive buffer until the peer goes away.
async fn run_reader(shared: Arc<Shared>, mut reader: OwnedReadHalf) {
    let mut chunk = vec![0u8; 16 * 1024];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("peer closed the connection");
                break;
            },
            Ok(n) => {
                let mut rx = lock_rx(&shared);
                if let Some(cipher) = rx.inbound.as_mut() {
                    cipher.apply(&mut chunk[..n]);
                }
                rx.buf.extend_from_slice(&chunk[..n]);
                if rx.reading == 0 && rx.exchanges == 0 {
                    dispatch_unsolicited(&mut rx, &shared.monitor);
                }
                drop(rx);
                shared.data.notify_waiters();
            },
            Err(error) => {
                warn!(%error, "socket read failed");
                break;
            },
        }
    }
    disconnect(&shared);
}

/// Consume complete unsolicited frames from the buffer head.
///
/// Only called while `reading == 0` and no exchange is active: at that point
/// the current closure owns no bytes and anything in the buffer is
/// server-initiated.
fn dispatch_unsolicited(rx: &mut RxState, monitor: &broadcast::Sender<MonitorEvent>) {
    loop {
        if rx.buf.len() < MONITOR_PREFIX.len() {
            return;
        }
        if rx.buf[..2] != MONITOR_PREFIX {
            warn!(len = rx.buf.len(), head = ?&rx.buf[..2], "unrecognised bytes on idle channel; draining");
            rx.buf.clear();
            return;
        }
        if rx.buf.len() < MONITOR_HEADER_SIZE {
            return;
        }
        let body_len =
            u32::from_be_bytes([rx.buf[4], rx.buf[5], rx.buf[6], rx.buf[7]]) as usize;
        if rx.buf.len() < MONITOR_HEADER_SIZE + body_len {
            return;
        }
        let frame = rx.buf.split_to(MONITOR_HEADER_SIZE + body_len);
        match cflbinary::parse(&frame[MONITOR_HEADER_SIZE..]) {
            Ok(payload) => {
                debug!(bytes = body_len, "monitor frame");
                let _ = monitor.send(MonitorEvent { payload });
            },
            Err(error) => warn!(%error, "undecodable monitor frame body"),
        }
    }
}

/// One TCP session with a base station.
pub struct Session {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl Session {
    /// Connect with default configuration.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(host, port, SessionConfig::default()).await
    }

    /// Connect with explicit configuration.
    pub async fn connect_with(host: &str, port: u16, config: SessionConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(config.connect_timeout))?
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let (monitor, _) = broadcast::channel(MONITOR_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            rx: StdMutex::new(RxState {
                buf: BytesMut::new(),
                reading: 0,
                exchanges: 0,
                connected: true,
                inbound: None,
            }),
            data: Notify::new(),
            tx: Mutex::new(TxState { writer: Some(write_half), outbound: None }),
            queue: Mutex::new(()),
            monitor,
            config,
        });

        let reader = tokio::spawn(run_reader(Arc::clone(&shared), read_half));
        Ok(Self { shared, reader })
    }

    /// Whether the peer is still reachable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock_rx(&self.shared).connected
    }

    /// Whether a session cipher has been installed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        lock_rx(&self.shared).inbound.is_some()
    }

    /// Subscribe to unsolicited monitor events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.monitor.subscribe()
    }

    /// Install the session cipher. Both directions switch over atomically:
    /// no byte is written or decoded between the halves being set.
    ///
    /// # Errors
    ///
    /// [`ClientError::EncryptionState`] when a cipher is already installed.
    pub async fn enable_encryption(&self, context: EncryptionContext) -> Result<()> {
        let mut tx = self.shared.tx.lock().await;
        let mut rx = lock_rx(&self.shared);
        if tx.outbound.is_some() || rx.inbound.is_some() {
            return Err(ClientError::EncryptionState);
        }
        let (outbound, inbound) = context.split();
        tx.outbound = Some(outbound);
        rx.inbound = Some(inbound);
        Ok(())
    }

    /// Join the request queue and take exclusive ownership of the socket for
    /// one exchange.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] when called after disconnect;
    /// [`TransportError::ConnectionLost`] when the peer went away while this
    /// caller was queued.
    pub async fn acquire(&self) -> Result<SessionHandle<'_>> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        let guard = self.shared.queue.lock().await;
        let mut rx = lock_rx(&self.shared);
        if !rx.connected {
            return Err(TransportError::ConnectionLost.into());
        }
        rx.exchanges += 1;
        drop(rx);
        Ok(SessionHandle { shared: &self.shared, _exchange: guard })
    }

    /// Shut the connection down and fail all pending work.
    pub async fn close(&self) {
        let mut tx = self.shared.tx.lock().await;
        if let Some(mut writer) = tx.writer.take() {
            let _ = writer.shutdown().await;
        }
        drop(tx);
        disconnect(&self.shared);
        self.reader.abort();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
        disconnect(&self.shared);
    }
}

/// Guard that tracks `receive` depth so the unsolicited dispatcher stays off
/// while a handle owns bytes mid-read.
struct ReadDepth<'a> {
    shared: &'a Shared,
}

impl<'a> ReadDepth<'a> {
    fn enter(shared: &'a Shared) -> Self {
        lock_rx(shared).reading += 1;
        Self { shared }
    }
}

impl Drop for ReadDepth<'_> {
    fn drop(&mut self) {
        lock_rx(self.shared).reading -= 1;
    }
}

/// Exclusive session access for one request/response exchange.
///
/// Dropping the handle releases the queue to the next waiter and lets the
/// unsolicited dispatcher look at any bytes the exchange left behind.
pub struct SessionHandle<'a> {
    shared: &'a Arc<Shared>,
    _exchange: MutexGuard<'a, ()>,
}

impl std::fmt::Debug for SessionHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

impl SessionHandle<'_> {
    /// Send raw bytes, encrypting when a session cipher is installed.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut tx = self.shared.tx.lock().await;
        let TxState { writer, outbound } = &mut *tx;
        let Some(writer) = writer.as_mut() else {
            return Err(TransportError::NotConnected.into());
        };
        let written = if let Some(cipher) = outbound.as_mut() {
            let mut sealed = data.to_vec();
            cipher.apply(&mut sealed);
            writer.write_all(&sealed).await
        } else {
            writer.write_all(data).await
        };
        written.map_err(|e| TransportError::Socket(e.to_string()))?;
        writer.flush().await.map_err(|e| TransportError::Socket(e.to_string()))?;
        Ok(())
    }

    /// Receive exactly `size` bytes with the session's default deadline.
    pub async fn receive(&mut self, size: usize) -> Result<Vec<u8>> {
        self.receive_timeout(size, self.shared.config.read_timeout).await
    }

    /// Receive exactly `size` bytes or fail with a timeout.
    ///
    /// # Errors
    ///
    /// [`TransportError::Timeout`] when the deadline passes first;
    /// [`TransportError::ConnectionLost`] when the peer goes away, including
    /// when part of the requested bytes had already arrived.
    pub async fn receive_timeout(&mut self, size: usize, wait: Duration) -> Result<Vec<u8>> {
        let _depth = ReadDepth::enter(self.shared);
        let wanted = async {
            loop {
                let notified = self.shared.data.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let mut rx = lock_rx(self.shared);
                    if rx.buf.len() >= size {
                        return Ok(rx.buf.split_to(size).to_vec());
                    }
                    if !rx.connected {
                        return Err(ClientError::Transport(TransportError::ConnectionLost));
                    }
                }
                notified.await;
            }
        };
        match timeout(wait, wanted).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(wait).into()),
        }
    }

    /// Receive and parse a 128-byte message header. Body fields are left as
    /// the header declared them; no body is read.
    pub async fn receive_message_header(&mut self) -> Result<Message> {
        let bytes = self.receive(HEADER_SIZE).await?;
        Ok(Message::parse_header(&bytes)?)
    }

    /// Receive a full message: header plus the declared body, verified
    /// against the body checksum.
    pub async fn receive_message(&mut self) -> Result<Message> {
        let mut message = self.receive_message_header().await?;
        if message.body_size > 0 {
            let body = self.receive(message.body_size as usize).await?;
            message.attach_body(body).map_err(ClientError::from)?;
        }
        Ok(message)
    }

    /// Receive just the fixed 12-byte property element header.
    pub async fn receive_property_element_header(&mut self) -> Result<ElementHeader> {
        let bytes = self.receive(ELEMENT_HEADER_SIZE).await?;
        let mut raw = [0u8; ELEMENT_HEADER_SIZE];
        raw.copy_from_slice(&bytes);
        Ok(ElementHeader::parse(raw))
    }

    /// Receive one property element. `None` marks the end-of-list sentinel
    /// (both the four-NUL-value and the tag-only forms).
    ///
    /// # Errors
    ///
    /// [`ClientError::Property`] when the element carries a per-property
    /// error code (`flags & 1`).
    pub async fn receive_property_element(&mut self) -> Result<Option<Property>> {
        let header = self.receive_property_element_header().await?;

        let value = if header.size > 0 {
            self.receive(header.size as usize).await?
        } else {
            Vec::new()
        };

        if header.is_sentinel() {
            return Ok(None);
        }
        if header.flags & FLAG_ERROR != 0 {
            let code = if value.len() >= 4 {
                i32::from_be_bytes([value[0], value[1], value[2], value[3]])
            } else {
                0
            };
            return Err(ClientError::Property { tag: header.name, code });
        }
        Ok(Some(Property::from_wire(header, value)?))
    }
}

impl Drop for SessionHandle<'_> {
    fn drop(&mut self) {
        let mut rx = lock_rx(self.shared);
        rx.exchanges -= 1;
        if rx.reading == 0 && rx.exchanges == 0 && rx.connected && !rx.buf.is_empty() {
            dispatch_unsolicited(&mut rx, &self.shared.monitor);
        }
    }
}
