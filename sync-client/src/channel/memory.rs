//! In-memory paired channel for testing and simulation.
//!
//! Both ends share one link state, so reachability is symmetric. Handles
//! are cheap to clone; a clone observes and controls the same end.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Channel, ChannelError};

type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

/// One end of an in-memory link.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    side: usize,
    link: Arc<Mutex<Link>>,
    inbox: Arc<tokio::sync::Mutex<Inbox>>,
}

#[derive(Debug)]
struct Link {
    reachable: bool,
    /// Indexed by receiving side.
    inboxes: [Option<mpsc::UnboundedSender<Vec<u8>>>; 2],
    /// Durable frames waiting for reachability, indexed by receiving side.
    pending: [Vec<(String, Vec<u8>)>; 2],
    /// Every frame handed to the link, indexed by sending side.
    sent: [Vec<Vec<u8>>; 2],
    /// Best-effort frames to lose silently, indexed by sending side.
    drop_next: [usize; 2],
}

impl Link {
    fn deliver(&self, to: usize, frame: Vec<u8>) -> Result<(), ChannelError> {
        let inbox = self.inboxes[to].as_ref().ok_or(ChannelError::Closed)?;
        inbox.send(frame).map_err(|_| ChannelError::Closed)
    }

    fn flush(&mut self) {
        for to in 0..2 {
            for (_, frame) in std::mem::take(&mut self.pending[to]) {
                if self.deliver(to, frame).is_err() {
                    tracing::debug!("Dropping durable frame for closed inbox");
                }
            }
        }
    }
}

impl MemoryChannel {
    /// Create two connected ends. The link starts reachable.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let link = Arc::new(Mutex::new(Link {
            reachable: true,
            inboxes: [Some(tx_a), Some(tx_b)],
            pending: [Vec::new(), Vec::new()],
            sent: [Vec::new(), Vec::new()],
            drop_next: [0, 0],
        }));
        let a = Self {
            side: 0,
            link: Arc::clone(&link),
            inbox: Arc::new(tokio::sync::Mutex::new(rx_a)),
        };
        let b = Self {
            side: 1,
            link,
            inbox: Arc::new(tokio::sync::Mutex::new(rx_b)),
        };
        (a, b)
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn peer(&self) -> usize {
        1 - self.side
    }

    /// Change reachability for both ends. Becoming reachable delivers every
    /// queued durable frame in the order it was last written.
    pub fn set_reachable(&self, reachable: bool) {
        let mut link = self.lock();
        let was = link.reachable;
        link.reachable = reachable;
        if reachable && !was {
            link.flush();
        }
    }

    /// Silently lose the next `count` best-effort frames sent from this end.
    pub fn drop_next(&self, count: usize) {
        let side = self.side;
        self.lock().drop_next[side] = count;
    }

    /// Every frame sent from this end, delivered or not.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock().sent[self.side].clone()
    }

    /// Durable frames from this end still waiting for the peer.
    pub fn pending_durable(&self) -> usize {
        let peer = self.peer();
        self.lock().pending[peer].len()
    }

    /// Close the link. Pending and future `recv()` calls on both ends fail
    /// once already-delivered frames are drained.
    pub fn close(&self) {
        let mut link = self.lock();
        link.inboxes = [None, None];
        link.pending = [Vec::new(), Vec::new()];
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send_best_effort(&self, frame: &[u8]) -> Result<(), ChannelError> {
        let (side, peer) = (self.side, self.peer());
        let mut link = self.lock();
        link.sent[side].push(frame.to_vec());

        if !link.reachable {
            return Err(ChannelError::Unreachable);
        }
        if link.drop_next[side] > 0 {
            link.drop_next[side] -= 1;
            return Ok(());
        }
        link.deliver(peer, frame.to_vec())
    }

    async fn send_durable(&self, key: &str, frame: &[u8]) -> Result<(), ChannelError> {
        let (side, peer) = (self.side, self.peer());
        let mut link = self.lock();
        link.sent[side].push(frame.to_vec());

        if link.reachable {
            return link.deliver(peer, frame.to_vec());
        }
        if link.inboxes[peer].is_none() {
            return Err(ChannelError::Closed);
        }
        let slots = &mut link.pending[peer];
        slots.retain(|(k, _)| k != key);
        slots.push((key.to_string(), frame.to_vec()));
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut inbox = self.inbox.lock().await;
        inbox.recv().await.ok_or(ChannelError::Closed)
    }

    fn is_reachable(&self) -> bool {
        self.lock().reachable
    }
}
