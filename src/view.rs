//! View Store
//!
//! Explicit application state for which top-level panel is showing. Every
//! view subscribes to the store instead of listening for broadcast events, so
//! a switch reaches all live listeners and missing listeners cost nothing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::watch;

use crate::session::SessionStore;

/// Store key holding the tab to show after a restart
pub const ACTIVE_TAB_KEY: &str = "activeTab";

/// Top-level panels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    /// Filing upload / conversion
    #[default]
    Convert,
    Chat,
    About,
    Docs,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Convert, Tab::Chat, Tab::About, Tab::Docs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Convert => "convert",
            Tab::Chat => "chat",
            Tab::About => "about",
            Tab::Docs => "docs",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Tab::ALL
            .into_iter()
            .find(|tab| tab.as_str() == wanted)
            .ok_or_else(|| TabError::Unknown(s.to_string()))
    }
}

/// View store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TabError {
    #[error("Unknown tab '{0}'. Valid: convert, chat, about, docs")]
    Unknown(String),
}

/// Single source of truth for the active tab
#[derive(Debug)]
pub struct ViewStore {
    active: watch::Sender<Tab>,
}

impl ViewStore {
    pub fn new(initial: Tab) -> Self {
        let (active, _) = watch::channel(initial);
        Self { active }
    }

    /// Start on the remembered tab, if any, consuming it
    ///
    /// The stored value is removed whether or not it names a valid tab, so a
    /// restore happens at most once.
    pub fn restore(store: &dyn SessionStore, default: Tab) -> Self {
        let initial = match store.get(ACTIVE_TAB_KEY) {
            Some(saved) => {
                if let Err(e) = store.remove(ACTIVE_TAB_KEY) {
                    tracing::warn!(error = %e, "Failed to clear remembered tab");
                }
                match saved.parse() {
                    Ok(tab) => {
                        tracing::debug!(tab = %tab, "Restored remembered tab");
                        tab
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring remembered tab");
                        default
                    }
                }
            }
            None => default,
        };

        Self::new(initial)
    }

    pub fn active(&self) -> Tab {
        *self.active.borrow()
    }

    /// Make `tab` active for every subscriber
    pub fn switch_tab(&self, tab: Tab) {
        let previous = self.active.send_replace(tab);
        if previous != tab {
            tracing::debug!(from = %previous, to = %tab, "Switched tab");
        }
    }

    /// Switch by identifier (e.g. "chat")
    pub fn switch_to(&self, id: &str) -> Result<Tab, TabError> {
        let tab = id.parse()?;
        self.switch_tab(tab);
        Ok(tab)
    }

    pub fn subscribe(&self) -> ViewListener {
        ViewListener {
            rx: self.active.subscribe(),
        }
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.active.receiver_count()
    }

    /// Remember `tab` so the next [`restore`](Self::restore) starts there
    pub fn remember_for_reload(store: &dyn SessionStore, tab: Tab) {
        if let Err(e) = store.set(ACTIVE_TAB_KEY, tab.as_str()) {
            tracing::warn!(error = %e, "Failed to remember tab");
        }
    }
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new(Tab::default())
    }
}

/// A view's subscription to the active tab
#[derive(Debug, Clone)]
pub struct ViewListener {
    rx: watch::Receiver<Tab>,
}

impl ViewListener {
    pub fn active(&self) -> Tab {
        *self.rx.borrow()
    }

    /// Wait for the next switch; `None` once the store is gone
    pub async fn changed(&mut self) -> Option<Tab> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
