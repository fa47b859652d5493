use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng as _;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::constants::{COMPLETION_POLL_INTERVAL, PEER_CLEANUP_INTERVAL, RECONNECT_DELAY_MAX, RECONNECT_DELAY_MIN};
use crate::metainfo::Sha1Hash;
use crate::scheduler::PieceScheduler;

use super::connection::{PeerConnection, PeerState};
use super::peer_id::PeerId;

struct PeerSlot {
    connection: Arc<PeerConnection>,
    reconnecting: bool,
    task: JoinHandle<()>,
}

/// Owns every peer connection of a download.
///
/// New endpoints get a task that connects, handshakes and runs the wire
/// loops. A periodic sweep drops terminally dead peers and schedules
/// reconnection (with exponential backoff) for the ones that merely timed
/// out. A completion watcher shuts everything down once the scheduler
/// reports the download finished.
pub struct PeerManager {
    scheduler: Arc<PieceScheduler>,
    info_hash: Sha1Hash,
    peer_id: PeerId,
    peers: Mutex<HashMap<SocketAddrV4, PeerSlot>>,
    service_tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl PeerManager {
    pub fn new(scheduler: Arc<PieceScheduler>, info_hash: Sha1Hash, peer_id: PeerId) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            info_hash,
            peer_id,
            peers: Mutex::new(HashMap::new()),
            service_tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Adds tracker-provided endpoints, spawning a connection task for
    /// every one not already known. Starts the background sweeps on first
    /// use.
    pub fn add_peers(self: &Arc<Self>, endpoints: Vec<SocketAddrV4>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.start();

        let mut peers = self.peers.lock();
        let mut added = 0;

        for addr in endpoints {
            if peers.contains_key(&addr) {
                continue;
            }

            let connection = Arc::new(PeerConnection::new(
                addr,
                self.info_hash,
                self.peer_id,
                self.scheduler.clone(),
            ));

            let task = tokio::spawn({
                let connection = connection.clone();
                async move {
                    if let Some(transport) = connection.connect().await {
                        connection.run(transport).await;
                    }
                }
            });

            peers.insert(
                addr,
                PeerSlot {
                    connection,
                    reconnecting: false,
                    task,
                },
            );
            added += 1;
        }

        if added > 0 {
            info!(added, total = peers.len(), "added peers");
        }
    }

    /// Number of peers currently past the handshake.
    pub fn connected_peers(&self) -> usize {
        self.peers
            .lock()
            .values()
            .filter(|slot| {
                matches!(
                    slot.connection.state(),
                    PeerState::Connected | PeerState::Running
                )
            })
            .count()
    }

    /// Stops the background sweeps and tears down every connection task.
    /// Aborting the tasks still runs their cleanup, so the scheduler's
    /// availability counters stay balanced.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        for task in self.service_tasks.lock().drain(..) {
            task.abort();
        }

        let mut peers = self.peers.lock();
        for (_, slot) in peers.drain() {
            slot.task.abort();
        }

        info!("peer manager stopped");
    }

    fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut tasks = self.service_tasks.lock();
        tasks.push(tokio::spawn(self.clone().cleanup_loop()));
        tasks.push(tokio::spawn(self.clone().completion_watch()));
    }

    /// Periodic sweep: forget the dead, schedule reconnects for the
    /// timed-out.
    async fn cleanup_loop(self: Arc<Self>) {
        loop {
            sleep(PEER_CLEANUP_INTERVAL).await;
            if self.stopped.load(Ordering::Acquire) {
                return;
            }

            let mut to_reconnect = Vec::new();
            {
                let mut peers = self.peers.lock();
                peers.retain(|addr, slot| {
                    if slot.reconnecting {
                        return true;
                    }
                    match slot.connection.state() {
                        PeerState::Disconnected => {
                            debug!(peer = %addr, "removing dead peer");
                            false
                        }
                        PeerState::TimedOut => {
                            slot.reconnecting = true;
                            to_reconnect.push(slot.connection.clone());
                            true
                        }
                        _ => true,
                    }
                });
            }

            for connection in to_reconnect {
                let task = tokio::spawn(self.clone().try_reconnection(connection.clone()));
                if let Some(slot) = self.peers.lock().get_mut(&connection.addr()) {
                    slot.task = task;
                }
            }
        }
    }

    /// Reconnects with exponential backoff until the peer answers or its
    /// retry budget runs out.
    async fn try_reconnection(self: Arc<Self>, connection: Arc<PeerConnection>) {
        let addr = connection.addr();
        debug!(peer = %addr, "trying to reconnect");

        let mut delay = {
            let mut rng = rand::rng();
            rng.random_range(RECONNECT_DELAY_MIN..=RECONNECT_DELAY_MAX)
        };

        while connection.retries_left() > 0 && !self.stopped.load(Ordering::Acquire) {
            sleep(delay).await;
            delay *= 2;

            if let Some(transport) = connection.connect().await {
                let task = tokio::spawn({
                    let connection = connection.clone();
                    async move { connection.run(transport).await }
                });

                let mut peers = self.peers.lock();
                if let Some(slot) = peers.get_mut(&addr) {
                    slot.reconnecting = false;
                    slot.task = task;
                }
                return;
            }
        }

        debug!(peer = %addr, "reconnection attempts exhausted");
        connection.force_disconnect();
        if let Some(slot) = self.peers.lock().get_mut(&addr) {
            slot.reconnecting = false;
        }
    }

    async fn completion_watch(self: Arc<Self>) {
        while !self.scheduler.is_finished() {
            sleep(COMPLETION_POLL_INTERVAL).await;
        }
        info!("download finished, stopping peers");
        self.stop();
    }
}
