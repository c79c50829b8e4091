use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::BalanceChanged;

const CHANNEL_CAPACITY: usize = 64;

/// Per-account broadcast of balance changes, read by subscribed connections.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<BalanceChanged>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to balance changes for an account. Creates the channel if needed.
    pub fn subscribe(&self, account_id: Ulid) -> broadcast::Receiver<BalanceChanged> {
        let sender = self
            .channels
            .entry(account_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// No-op if nobody is listening.
    pub fn balance_changed(&self, account_id: Ulid, balance: u32) {
        if let Some(sender) = self.channels.get(&account_id) {
            let _ = sender.send(BalanceChanged { account_id, balance });
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
