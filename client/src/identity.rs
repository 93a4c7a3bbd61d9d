//! Identity binding: which account the client acts as.

use tally_types::Identity;
use tokio::sync::watch;

/// Holds the active local identity and announces changes.
///
/// Cloning shares the binding, so a wallet adapter can switch accounts while
/// the orchestrator watches for the change.
#[derive(Clone)]
pub struct IdentityBinding {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentityBinding {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn unbound() -> Self {
        Self::new(None)
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Switch to `identity`. Returns `true` if this changed the binding.
    pub fn bind(&self, identity: Identity) -> bool {
        self.replace(Some(identity))
    }

    /// Disconnect. Returns `true` if an identity was bound.
    pub fn unbind(&self) -> bool {
        self.replace(None)
    }

    /// Subscribe to changes. Rebinding the same identity does not notify.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    fn replace(&self, next: Option<Identity>) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            match &next {
                Some(id) => tracing::info!(identity = %id.short(), "identity bound"),
                None => tracing::info!("identity unbound"),
            }
        }
        changed
    }
}

impl Default for IdentityBinding {
    fn default() -> Self {
        Self::unbound()
    }
}
