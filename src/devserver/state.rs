//! Dev Server State
//!
//! Per-session sockets and assistant modes, shared by every handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::chat::ServerFrame;
use crate::config::DevServerConfig;
use crate::upload::AssistantMode;

/// Sessions with a non-default mode kept before pruning starts
pub const DEFAULT_MODE_CAPACITY: usize = 1024;

/// Shared state for all handlers
pub struct DevState {
    pub config: Arc<DevServerConfig>,
    pub hub: SocketHub,
    /// Session id → mode the assistant answers in, with the tick it was last set
    modes: RwLock<HashMap<String, (AssistantMode, u64)>>,
    mode_capacity: usize,
    tick: AtomicU64,
}

impl DevState {
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            hub: SocketHub::default(),
            modes: RwLock::new(HashMap::new()),
            mode_capacity: DEFAULT_MODE_CAPACITY,
            tick: AtomicU64::new(0),
        }
    }

    pub fn with_mode_capacity(mut self, capacity: usize) -> Self {
        self.mode_capacity = capacity.max(1);
        self
    }

    /// Current mode for a session, preloaded until told otherwise
    pub async fn mode(&self, session_id: &str) -> AssistantMode {
        self.modes
            .read()
            .await
            .get(session_id)
            .map(|(mode, _)| *mode)
            .unwrap_or(AssistantMode::Preloaded)
    }

    /// Record a session's mode
    ///
    /// Preloaded is the default and is not stored. Past capacity, sessions
    /// without a live socket are forgotten first, then the least recently set.
    pub async fn set_mode(&self, session_id: &str, mode: AssistantMode) {
        let mut modes = self.modes.write().await;

        let previous = if mode == AssistantMode::Preloaded {
            modes.remove(session_id)
        } else {
            let tick = self.tick.fetch_add(1, Ordering::Relaxed);
            modes.insert(session_id.to_string(), (mode, tick))
        };
        tracing::info!(
            session_id = %session_id,
            mode = %mode,
            previous = ?previous.map(|(mode, _)| mode),
            "Mode set"
        );

        if modes.len() > self.mode_capacity {
            self.prune_modes(&mut modes, session_id).await;
        }
    }

    async fn prune_modes(
        &self,
        modes: &mut HashMap<String, (AssistantMode, u64)>,
        keep: &str,
    ) {
        let before = modes.len();
        {
            let sockets = self.hub.sockets.read().await;
            modes.retain(|id, _| id == keep || sockets.contains_key(id));
        }

        if modes.len() > self.mode_capacity {
            let mut by_age: Vec<(u64, String)> = modes
                .iter()
                .filter(|(id, _)| id.as_str() != keep)
                .map(|(id, (_, tick))| (*tick, id.clone()))
                .collect();
            by_age.sort_unstable();
            let excess = modes.len() - self.mode_capacity;
            for (_, id) in by_age.into_iter().take(excess) {
                modes.remove(&id);
            }
        }

        tracing::debug!(before, after = modes.len(), "Pruned session modes");
    }
}

impl Default for DevState {
    fn default() -> Self {
        Self::new(DevServerConfig::default())
    }
}

struct SocketHandle {
    connection_id: String,
    sender: mpsc::UnboundedSender<ServerFrame>,
}

/// Live sockets keyed by session id
///
/// One socket per session; a reconnecting client replaces its old entry.
#[derive(Default)]
pub struct SocketHub {
    sockets: RwLock<HashMap<String, SocketHandle>>,
}

impl SocketHub {
    /// Register a socket for `session_id`, returning its connection id
    pub async fn register(
        &self,
        session_id: &str,
        sender: mpsc::UnboundedSender<ServerFrame>,
    ) -> String {
        let connection_id = Uuid::new_v4().to_string();
        let replaced = self.sockets.write().await.insert(
            session_id.to_string(),
            SocketHandle {
                connection_id: connection_id.clone(),
                sender,
            },
        );

        if replaced.is_some() {
            tracing::debug!(session_id = %session_id, "Replaced existing socket");
        }
        tracing::info!(session_id = %session_id, connection_id = %connection_id, "WebSocket connected");
        connection_id
    }

    /// Remove the socket, unless a newer connection already took its place
    pub async fn unregister(&self, session_id: &str, connection_id: &str) {
        let mut sockets = self.sockets.write().await;
        if sockets
            .get(session_id)
            .is_some_and(|h| h.connection_id == connection_id)
        {
            sockets.remove(session_id);
        }
        tracing::info!(session_id = %session_id, connection_id = %connection_id, "WebSocket disconnected");
    }

    /// Queue a frame for a session's socket; false if it isn't connected
    pub async fn send_to(&self, session_id: &str, frame: ServerFrame) -> bool {
        match self.sockets.read().await.get(session_id) {
            Some(handle) => handle.sender.send(frame).is_ok(),
            None => false,
        }
    }

    pub async fn is_connected(&self, session_id: &str) -> bool {
        self.sockets.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sockets.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mode_defaults_to_preloaded() {
        let state = DevState::default();
        assert_eq!(state.mode("s1").await, AssistantMode::Preloaded);

        state.set_mode("s1", AssistantMode::UserJson).await;
        assert_eq!(state.mode("s1").await, AssistantMode::UserJson);
        assert_eq!(state.mode("s2").await, AssistantMode::Preloaded);

        state.set_mode("s1", AssistantMode::Preloaded).await;
        assert_eq!(state.mode("s1").await, AssistantMode::Preloaded);
        assert!(state.modes.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_modes_stay_bounded() {
        let state = DevState::default().with_mode_capacity(8);
        let (tx, _rx) = mpsc::unbounded_channel();
        state.hub.register("live", tx).await;
        state.set_mode("live", AssistantMode::UserJson).await;

        for i in 0..100 {
            state
                .set_mode(&format!("gone-{}", i), AssistantMode::ConvertedXbrl)
                .await;
        }

        assert!(state.modes.read().await.len() <= 8);
        assert_eq!(state.mode("live").await, AssistantMode::UserJson);
        assert_eq!(state.mode("gone-99").await, AssistantMode::ConvertedXbrl);
    }

    #[tokio::test]
    async fn test_modes_bounded_with_many_live_sockets() {
        let state = DevState::default().with_mode_capacity(4);
        let mut receivers = Vec::new();
        for i in 0..10 {
            let (tx, rx) = mpsc::unbounded_channel();
            receivers.push(rx);
            let id = format!("s{}", i);
            state.hub.register(&id, tx).await;
            state.set_mode(&id, AssistantMode::UserJson).await;
        }

        assert_eq!(state.modes.read().await.len(), 4);
        assert_eq!(state.mode("s9").await, AssistantMode::UserJson);
        assert_eq!(state.mode("s0").await, AssistantMode::Preloaded);
    }

    #[tokio::test]
    async fn test_send_to_registered_socket() {
        let hub = SocketHub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("s1", tx).await;

        assert!(hub.send_to("s1", ServerFrame::StreamEnd).await);
        assert_eq!(rx.recv().await, Some(ServerFrame::StreamEnd));
        assert!(!hub.send_to("nobody", ServerFrame::StreamEnd).await);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_socket() {
        let hub = SocketHub::default();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();

        let old_id = hub.register("s1", old_tx).await;
        let new_id = hub.register("s1", new_tx).await;
        assert_eq!(hub.len().await, 1);

        hub.unregister("s1", &old_id).await;
        assert!(hub.is_connected("s1").await);

        hub.unregister("s1", &new_id).await;
        assert!(!hub.is_connected("s1").await);
    }
}
