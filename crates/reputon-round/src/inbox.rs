// crates/reputon-round/src/inbox.rs
//
// Two-phase inbox for peer proofs.
//
// The handle side can be cloned into whatever delivers broadcasts and fed
// any number of times, in any order, before scoring. The round side drains
// everything once the window closes; deliveries after that are refused.

use tokio::sync::mpsc;

use reputon_core::identity::PeerKey;
use reputon_core::round::InboundMessage;

/// Create a connected inbox pair for one round.
pub fn round_inbox() -> (InboxHandle, RoundInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxHandle { tx }, RoundInbox { rx })
}

/// Delivery side.
#[derive(Debug, Clone)]
pub struct InboxHandle {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl InboxHandle {
    /// Buffer a payload from `peer`. Returns false once the window closed.
    pub fn deliver(&self, peer: PeerKey, payload: Vec<u8>) -> bool {
        self.tx.send(InboundMessage { peer, payload }).is_ok()
    }
}

/// Round side.
#[derive(Debug)]
pub struct RoundInbox {
    rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl RoundInbox {
    /// Close the inbox and return everything buffered, in arrival order.
    pub fn drain(&mut self) -> Vec<InboundMessage> {
        self.rx.close();
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}
