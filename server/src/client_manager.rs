//! Peer slot table and fan-out for the multiplayer server.
//!
//! Every TCP peer, playing or merely observing, occupies one of
//! [`MAX_PEERS`] slots. A slot holds the write half of the peer's
//! socket, the lobby/game flags and the peer's pending move; its own
//! mutex is the unit of exclusion, so the receive loop, the join task
//! and the game master can each touch one peer at a time without a
//! global lock. Occupancy is tracked separately so the acceptor can
//! park itself until a disconnect frees a slot.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use shared::messages::ClientMessage;
use shared::transport;
use shared::types::PlayerId;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, MutexGuard, Notify};

/// Hard cap on simultaneously connected peers.
pub const MAX_PEERS: usize = 25;

/// Per-connection state guarded by the slot's mutex.
pub struct PeerSlot {
    pub writer: OwnedWriteHalf,
    /// Textual remote endpoint, kept for logs and `Player.address`.
    pub addr: String,
    /// Set once the peer has been admitted to the current game cycle.
    pub in_game: bool,
    pub player_id: Option<PlayerId>,
    /// Most recent move-class message since the last tick; each new one
    /// overwrites the last.
    pub pending: Option<ClientMessage>,
}

impl PeerSlot {
    pub fn new(writer: OwnedWriteHalf, addr: String) -> Self {
        Self {
            writer,
            addr,
            in_game: false,
            player_id: None,
            pending: None,
        }
    }
}

/// Fixed-capacity table of connected peers.
pub struct PeerTable {
    slots: Vec<Mutex<Option<PeerSlot>>>,
    connected: AtomicUsize,
    slot_freed: Notify,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_PEERS).map(|_| Mutex::new(None)).collect(),
            connected: AtomicUsize::new(0),
            slot_freed: Notify::new(),
        }
    }

    pub fn connected(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    /// Parks the acceptor until the table has room for one more peer.
    /// The caller still must [`Self::add_connection`] after accepting.
    pub async fn wait_for_room(&self) {
        loop {
            let freed = self.slot_freed.notified();
            if self.connected() < MAX_PEERS {
                return;
            }
            debug!("peer table full, acceptor waiting for a disconnect");
            freed.await;
        }
    }

    pub fn add_connection(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn remove_connection(&self) {
        self.connected.fetch_sub(1, Ordering::SeqCst);
        self.slot_freed.notify_one();
    }

    /// Places a hailed peer into the first free slot. `None` only if
    /// every slot is occupied, which the acceptor's gating rules out.
    pub async fn insert(&self, slot: PeerSlot) -> Option<usize> {
        for (index, entry) in self.slots.iter().enumerate() {
            let mut guard = entry.lock().await;
            if guard.is_none() {
                *guard = Some(slot);
                return Some(index);
            }
        }
        None
    }

    /// Direct access to one slot's mutex; used by the receive loop, the
    /// join task and the game master's move gathering.
    pub async fn lock(&self, index: usize) -> MutexGuard<'_, Option<PeerSlot>> {
        self.slots[index].lock().await
    }

    /// Empties a slot on disconnect, returning what was in it.
    pub async fn vacate(&self, index: usize) -> Option<PeerSlot> {
        self.slots[index].lock().await.take()
    }

    /// Sends one pre-serialised message to every occupied slot. Send
    /// failures are ignored here: the failing peer's receive loop will
    /// observe the broken socket and free the slot itself.
    pub async fn broadcast(&self, bytes: &[u8]) {
        for (index, entry) in self.slots.iter().enumerate() {
            let mut guard = entry.lock().await;
            if let Some(slot) = guard.as_mut() {
                if let Err(err) = transport::send_bytes(&mut slot.writer, bytes).await {
                    debug!("broadcast to slot {index} ({}) failed: {err}", slot.addr);
                }
            }
        }
    }

    /// Clears the in-game flag on every peer at the end of a game, so
    /// each must join again to play the next one.
    pub async fn reset_in_game(&self) {
        for entry in &self.slots {
            let mut guard = entry.lock().await;
            if let Some(slot) = guard.as_mut() {
                slot.in_game = false;
                slot.player_id = None;
                slot.pending = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::Direction;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    /// A connected socket pair; the accepted side feeds the table, the
    /// client side observes broadcasts.
    async fn socket_pair() -> (OwnedWriteHalf, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        let (_, writer) = accepted.into_split();
        (writer, client)
    }

    #[tokio::test]
    async fn insert_fills_lowest_free_slot() {
        let table = PeerTable::new();
        let (w1, _c1) = socket_pair().await;
        let (w2, _c2) = socket_pair().await;

        let first = table.insert(PeerSlot::new(w1, "a".into())).await;
        let second = table.insert(PeerSlot::new(w2, "b".into())).await;
        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));

        let (w3, _c3) = socket_pair().await;
        table.vacate(0).await;
        let reused = table.insert(PeerSlot::new(w3, "c".into())).await;
        assert_eq!(reused, Some(0));
    }

    #[tokio::test]
    async fn pending_move_is_overwritten_not_queued() {
        let table = PeerTable::new();
        let (writer, _client) = socket_pair().await;
        let index = table
            .insert(PeerSlot::new(writer, "a".into()))
            .await
            .unwrap();

        for direction in [Direction::Up, Direction::Left] {
            let mut guard = table.lock(index).await;
            if let Some(slot) = guard.as_mut() {
                slot.pending = Some(ClientMessage::Move { direction });
            }
        }

        let mut guard = table.lock(index).await;
        let pending = guard.as_mut().and_then(|slot| slot.pending.take());
        assert_eq!(
            pending,
            Some(ClientMessage::Move {
                direction: Direction::Left
            })
        );
        assert!(guard.as_mut().unwrap().pending.is_none());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_occupied_slot() {
        let table = PeerTable::new();
        let (w1, mut c1) = socket_pair().await;
        let (w2, mut c2) = socket_pair().await;
        table.insert(PeerSlot::new(w1, "a".into())).await;
        table.insert(PeerSlot::new(w2, "b".into())).await;

        table.broadcast(&[1, 2, 3]).await;

        for client in [&mut c1, &mut c2] {
            let mut buf = [0u8; 3];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, [1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn broadcast_survives_a_dead_peer() {
        let table = PeerTable::new();
        let (w1, c1) = socket_pair().await;
        let (w2, mut c2) = socket_pair().await;
        table.insert(PeerSlot::new(w1, "a".into())).await;
        table.insert(PeerSlot::new(w2, "b".into())).await;
        drop(c1);

        // The dead slot is skipped over without disturbing the rest.
        table.broadcast(&[9]).await;
        table.broadcast(&[9]).await;

        let mut buf = [0u8; 1];
        c2.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [9]);
    }

    #[tokio::test]
    async fn reset_in_game_clears_flags() {
        let table = PeerTable::new();
        let (writer, _client) = socket_pair().await;
        let index = table
            .insert(PeerSlot::new(writer, "a".into()))
            .await
            .unwrap();
        {
            let mut guard = table.lock(index).await;
            let slot = guard.as_mut().unwrap();
            slot.in_game = true;
            slot.player_id = Some(3);
            slot.pending = Some(ClientMessage::PlaceBomb);
        }

        table.reset_in_game().await;

        let mut guard = table.lock(index).await;
        let slot = guard.as_mut().unwrap();
        assert!(!slot.in_game);
        assert_eq!(slot.player_id, None);
        assert_eq!(slot.pending, None);
    }

    #[tokio::test]
    async fn connection_count_gates_room() {
        let table = PeerTable::new();
        assert_eq!(table.connected(), 0);
        table.add_connection();
        assert_eq!(table.connected(), 1);
        table.remove_connection();
        assert_eq!(table.connected(), 0);
        // With room available this returns immediately.
        table.wait_for_room().await;
    }
}
