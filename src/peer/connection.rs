use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

use crate::constants::{
    BLOCK_REQUEST_TIMEOUT, CONNECTION_TIMEOUT, MAX_BLOCKS_IN_FLIGHT, MAX_BLOCKS_PER_REQUEST,
    MAX_RETRIES, REQUEST_INTERVAL,
};
use crate::metainfo::Sha1Hash;
use crate::scheduler::PieceScheduler;

use super::bitfield::Bitfield;
use super::error::PeerError;
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use super::transport::{MessageReader, MessageWriter, PeerTransport};

/// Lifecycle of a peer connection.
///
/// `TimedOut` peers are worth reconnecting to with backoff;
/// `Disconnected` is terminal for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Uninitiated,
    Connecting,
    Connected,
    Running,
    Disconnected,
    TimedOut,
}

struct PendingRequest {
    piece_index: u32,
    offset: u32,
    requested_at: Instant,
}

/// One remote peer: the handshake state machine plus the request/receive
/// loops that run over the established connection.
///
/// The peer manager holds connections in an `Arc` and observes
/// [`PeerConnection::state`] while the spawned tasks drive the protocol.
/// All mutable state is behind atomics or short-lived locks so the sender
/// and receiver halves can work concurrently.
pub struct PeerConnection {
    addr: SocketAddrV4,
    info_hash: Sha1Hash,
    local_peer_id: PeerId,
    scheduler: Arc<PieceScheduler>,

    state: Mutex<PeerState>,
    retries_left: AtomicU32,

    am_choking: AtomicBool,
    am_interested: AtomicBool,
    peer_choking: AtomicBool,
    peer_interested: AtomicBool,

    bitfield: Mutex<Bitfield>,
    bitfield_received: AtomicBool,
    pending: Mutex<Vec<PendingRequest>>,
}

impl PeerConnection {
    pub fn new(
        addr: SocketAddrV4,
        info_hash: Sha1Hash,
        local_peer_id: PeerId,
        scheduler: Arc<PieceScheduler>,
    ) -> Self {
        let piece_count = scheduler.piece_count();
        Self {
            addr,
            info_hash,
            local_peer_id,
            scheduler,
            state: Mutex::new(PeerState::Uninitiated),
            retries_left: AtomicU32::new(MAX_RETRIES),
            am_choking: AtomicBool::new(true),
            am_interested: AtomicBool::new(false),
            peer_choking: AtomicBool::new(true),
            peer_interested: AtomicBool::new(false),
            bitfield: Mutex::new(Bitfield::new(piece_count)),
            bitfield_received: AtomicBool::new(false),
            pending: Mutex::new(Vec::with_capacity(MAX_BLOCKS_IN_FLIGHT)),
        }
    }

    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock()
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left.load(Ordering::Acquire)
    }

    /// Marks the connection terminally dead (e.g., reconnect attempts
    /// exhausted).
    pub fn force_disconnect(&self) {
        *self.state.lock() = PeerState::Disconnected;
    }

    /// Opens the TCP connection and exchanges handshakes.
    ///
    /// Consumes one retry. On success the state is `Connected`, the retry
    /// budget is refilled and the ready transport is returned. On failure
    /// the state records whether the attempt timed out (reconnectable) or
    /// failed outright.
    pub async fn connect(&self) -> Option<PeerTransport> {
        if self.retries_left.load(Ordering::Acquire) == 0 {
            return None;
        }
        self.retries_left.fetch_sub(1, Ordering::AcqRel);

        self.reset_session_state();
        *self.state.lock() = PeerState::Connecting;

        let stream = match timeout(CONNECTION_TIMEOUT, TcpStream::connect(self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(peer = %self.addr, error = %e, "tcp connect failed");
                self.handle_failure(&PeerError::Io(e));
                return None;
            }
            Err(_) => {
                debug!(peer = %self.addr, "tcp connect timed out");
                self.handle_failure(&PeerError::Timeout);
                return None;
            }
        };

        let mut transport = PeerTransport::new(stream);

        let handshake = Handshake::new(self.info_hash, *self.local_peer_id.as_bytes());
        if let Err(e) = transport.send_handshake(&handshake).await {
            debug!(peer = %self.addr, error = %e, "failed to send handshake");
            self.handle_failure(&e);
            return None;
        }

        let remote = match transport.receive_handshake().await {
            Ok(remote) => remote,
            Err(e) => {
                debug!(peer = %self.addr, error = %e, "failed to receive handshake");
                self.handle_failure(&e);
                return None;
            }
        };

        if remote.info_hash != self.info_hash {
            debug!(peer = %self.addr, "handshake info hash mismatch");
            *self.state.lock() = PeerState::Disconnected;
            return None;
        }

        // Peer id is logged but never enforced; trackers hand out peers
        // whose ids we cannot predict.
        trace!(peer = %self.addr, remote_id = ?remote.peer_id, "handshake complete");

        *self.state.lock() = PeerState::Connected;
        self.retries_left.store(MAX_RETRIES, Ordering::Release);

        Some(transport)
    }

    /// Drives the connection: one sender loop batching block requests, one
    /// receiver loop dispatching peer messages, joined first-to-finish.
    ///
    /// Both loops end when the scheduler reports the download finished or
    /// either side hits an error; the loser of the race is cancelled and
    /// the socket dropped. Availability bookkeeping is undone on every
    /// exit path, including cancellation of the whole task.
    pub async fn run(&self, transport: PeerTransport) {
        *self.state.lock() = PeerState::Running;

        let _availability = AvailabilityGuard { conn: self };
        let (mut reader, mut writer) = transport.split();

        // Leech-only: announce interest up front and never unchoke anyone.
        if let Err(e) = writer.send_message(&Message::Interested).await {
            debug!(peer = %self.addr, error = %e, "failed to send interested");
            self.handle_failure(&e);
            return;
        }
        self.am_interested.store(true, Ordering::Release);

        let result = tokio::select! {
            r = self.send_requests(&mut writer) => r,
            r = self.receive_messages(&mut reader) => r,
        };

        match result {
            Ok(()) => *self.state.lock() = PeerState::Disconnected,
            Err(e) => {
                debug!(peer = %self.addr, error = %e, "peer connection ended");
                self.handle_failure(&e);
            }
        }
    }

    async fn send_requests(&self, writer: &mut MessageWriter) -> Result<(), PeerError> {
        let mut batch = BytesMut::new();

        while !self.scheduler.is_finished() {
            sleep(REQUEST_INTERVAL).await;

            if self.peer_choking.load(Ordering::Acquire) {
                continue;
            }

            self.prune_pending();

            let in_flight = self.pending.lock().len();
            let room = MAX_BLOCKS_IN_FLIGHT
                .saturating_sub(in_flight)
                .min(MAX_BLOCKS_PER_REQUEST);
            if room == 0 {
                continue;
            }

            batch.clear();
            let mut queued = 0;
            {
                // Lock order is always bitfield, then scheduler.
                let bitfield = self.bitfield.lock();
                for _ in 0..room {
                    let Some(request) = self.scheduler.request_next_block(&bitfield) else {
                        break;
                    };

                    Message::Request {
                        index: request.piece_index,
                        begin: request.offset,
                        length: request.length,
                    }
                    .encode_into(&mut batch);

                    self.pending.lock().push(PendingRequest {
                        piece_index: request.piece_index,
                        offset: request.offset,
                        requested_at: Instant::now(),
                    });
                    queued += 1;
                }
            }

            if queued == 0 {
                continue;
            }

            trace!(peer = %self.addr, blocks = queued, "sending request batch");
            writer.send_raw(&batch).await?;
        }

        Ok(())
    }

    async fn receive_messages(&self, reader: &mut MessageReader) -> Result<(), PeerError> {
        while !self.scheduler.is_finished() {
            match reader.receive_message().await? {
                Message::KeepAlive => {}
                Message::Choke => self.peer_choking.store(true, Ordering::Release),
                Message::Unchoke => self.peer_choking.store(false, Ordering::Release),
                Message::Interested => self.peer_interested.store(true, Ordering::Release),
                Message::NotInterested => self.peer_interested.store(false, Ordering::Release),
                Message::Have { piece } => {
                    self.bitfield.lock().set_piece(piece as usize);
                    self.scheduler.add_available_piece(piece);
                }
                Message::Bitfield(bytes) => {
                    let bitfield = Bitfield::from_bytes(&bytes, self.scheduler.piece_count());
                    *self.bitfield.lock() = bitfield.clone();
                    self.scheduler.add_peer_bitfield(&bitfield);
                    self.bitfield_received.store(true, Ordering::Release);
                }
                Message::Piece { index, begin, data } => {
                    self.scheduler.receive_block(index, begin, &data);
                    self.complete_pending(index, begin);
                }
                // No upload support: requests and everything else are
                // accepted and dropped.
                Message::Request { .. }
                | Message::Cancel { .. }
                | Message::Port(_)
                | Message::Unknown { .. } => {}
            }
        }

        Ok(())
    }

    /// Frees in-flight slots whose requests have gone unanswered; the
    /// scheduler will naturally re-offer those blocks elsewhere.
    fn prune_pending(&self) {
        let now = Instant::now();
        self.pending
            .lock()
            .retain(|req| now.duration_since(req.requested_at) < BLOCK_REQUEST_TIMEOUT);
    }

    fn complete_pending(&self, piece_index: u32, offset: u32) {
        let mut pending = self.pending.lock();
        if let Some(pos) = pending
            .iter()
            .position(|req| req.piece_index == piece_index && req.offset == offset)
        {
            pending.swap_remove(pos);
        }
    }

    fn handle_failure(&self, error: &PeerError) {
        *self.state.lock() = if error.is_timeout() {
            PeerState::TimedOut
        } else {
            PeerState::Disconnected
        };
    }

    fn reset_session_state(&self) {
        self.am_choking.store(true, Ordering::Release);
        self.am_interested.store(false, Ordering::Release);
        self.peer_choking.store(true, Ordering::Release);
        self.peer_interested.store(false, Ordering::Release);
        self.bitfield_received.store(false, Ordering::Release);
        *self.bitfield.lock() = Bitfield::new(self.scheduler.piece_count());
        self.pending.lock().clear();
    }
}

/// Undoes this peer's contribution to the availability counters when the
/// running connection winds down.
///
/// Lives inside [`PeerConnection::run`]'s future, so it fires on clean
/// exit, on error, and when the task is aborted mid-await.
struct AvailabilityGuard<'a> {
    conn: &'a PeerConnection,
}

impl Drop for AvailabilityGuard<'_> {
    fn drop(&mut self) {
        if self.conn.bitfield_received.swap(false, Ordering::AcqRel) {
            let bitfield = self.conn.bitfield.lock();
            self.conn.scheduler.remove_peer_bitfield(&bitfield);
        }
    }
}
