//! Registry of the server's open rotating listeners.
//!
//! Entries are keyed by probe offset. Only the reconciler adds and removes
//! entries; queries take a shared lock, mutations an exclusive one. Sockets
//! are closed outside of the lock.

use porthop_core::PortAssignment;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Public view of an open listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerInfo {
    /// Port and window the listener serves
    pub assignment: PortAssignment,
    /// Address the socket is bound to
    pub local_addr: SocketAddr,
}

impl ListenerInfo {
    /// Probe offset of the listener
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.assignment.offset()
    }

    /// Listening port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.assignment.port
    }
}

/// An open listener and the task serving it
#[derive(Debug)]
pub struct ListenerEntry {
    info: ListenerInfo,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerEntry {
    /// Wrap a spawned serve task.
    ///
    /// `token` must be the token the task stops on.
    #[must_use]
    pub fn new(
        assignment: PortAssignment,
        local_addr: SocketAddr,
        token: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            info: ListenerInfo {
                assignment,
                local_addr,
            },
            token,
            task,
        }
    }

    /// Public view of this entry
    #[must_use]
    pub fn info(&self) -> ListenerInfo {
        self.info
    }

    /// Whether the entry's window has ended at `now`
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.info.assignment.window.is_expired(now)
    }

    /// Stop the serve task and wait for it, which releases the socket.
    pub async fn close(self) -> ListenerInfo {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Listener task on {} ended abnormally: {}", self.info.local_addr, e);
        }
        self.info
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<i64, ListenerEntry>,
    closed: bool,
}

/// Open listeners keyed by offset
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    state: RwLock<RegistryState>,
}

impl ListenerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open listeners
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether no listener is open
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Whether `shutdown` has been called
    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Whether a listener exists for `offset`
    pub async fn contains(&self, offset: i64) -> bool {
        self.state.read().await.entries.contains_key(&offset)
    }

    /// Listener currently serving `port`, if any
    pub async fn port_holder(&self, port: u16) -> Option<ListenerInfo> {
        self.state
            .read()
            .await
            .entries
            .values()
            .map(ListenerEntry::info)
            .find(|info| info.port() == port)
    }

    /// All open listeners, ordered by offset
    pub async fn snapshot(&self) -> Vec<ListenerInfo> {
        let mut listeners: Vec<ListenerInfo> = self
            .state
            .read()
            .await
            .entries
            .values()
            .map(ListenerEntry::info)
            .collect();
        listeners.sort_by_key(ListenerInfo::offset);
        listeners
    }

    /// Register an entry.
    ///
    /// After shutdown the entry is closed instead and `false` is returned.
    /// An existing entry for the same offset is replaced and closed.
    pub async fn insert(&self, entry: ListenerEntry) -> bool {
        let offset = entry.info.offset();

        let (rejected, replaced) = {
            let mut state = self.state.write().await;
            if state.closed {
                (Some(entry), None)
            } else {
                (None, state.entries.insert(offset, entry))
            }
        };

        if let Some(entry) = rejected {
            tracing::debug!("Registry is shut down, closing listener on {}", entry.info.local_addr);
            entry.close().await;
            return false;
        }

        if let Some(old) = replaced {
            tracing::warn!(
                "Replacing listener for offset {:+} on port {}",
                offset,
                old.info.port()
            );
            old.close().await;
        }

        true
    }

    /// Remove and close every listener whose window has ended at `now`.
    ///
    /// Returns the closed listeners, ordered by offset.
    pub async fn remove_expired(&self, now: i64) -> Vec<ListenerInfo> {
        let expired: Vec<ListenerEntry> = {
            let mut state = self.state.write().await;
            let offsets: Vec<i64> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(offset, _)| *offset)
                .collect();
            offsets
                .into_iter()
                .filter_map(|offset| state.entries.remove(&offset))
                .collect()
        };

        let mut closed = Vec::with_capacity(expired.len());
        for entry in expired {
            closed.push(entry.close().await);
        }
        closed.sort_by_key(ListenerInfo::offset);
        closed
    }

    /// Close every listener and refuse new ones.
    ///
    /// Returns the number of listeners closed; repeated calls close nothing.
    pub async fn shutdown(&self) -> usize {
        let entries: Vec<ListenerEntry> = {
            let mut state = self.state.write().await;
            state.closed = true;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = entries.len();
        for entry in entries {
            let info = entry.close().await;
            tracing::debug!("Closed listener on port {} (offset {:+})", info.port(), info.offset());
        }
        count
    }
}
