// src/engine/status.rs
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::StatusError;
use crate::models::game::QueryStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub game_id: String,
    pub from: QueryStatus,
    pub to: QueryStatus,
}

pub type StatusObserver = Box<dyn Fn(&StatusEvent) + Send + Sync>;

/// Per-game query state machine. Transitions are driven by the engine only;
/// observers are called synchronously in subscription order.
#[derive(Default)]
pub struct StatusTracker {
    statuses: RwLock<HashMap<String, QueryStatus>>,
    observers: RwLock<Vec<StatusObserver>>,
}

impl StatusTracker {
    pub fn new<I, S>(game_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statuses: RwLock::new(
                game_ids
                    .into_iter()
                    .map(|id| (id.into(), QueryStatus::Unqueried))
                    .collect(),
            ),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn status(&self, game_id: &str) -> Option<QueryStatus> {
        self.statuses.read().get(game_id).copied()
    }

    pub fn subscribe(&self, observer: impl Fn(&StatusEvent) + Send + Sync + 'static) {
        self.observers.write().push(Box::new(observer));
    }

    /// Records a transition and runs `apply` while the new status is being
    /// published, so dependent state changes land with it. Observers are not
    /// called here; see [`StatusTracker::notify`].
    pub(crate) fn transition<F>(
        &self,
        game_id: &str,
        to: QueryStatus,
        apply: F,
    ) -> Result<StatusEvent, StatusError>
    where
        F: FnOnce(),
    {
        let mut statuses = self.statuses.write();
        let current = statuses
            .get_mut(game_id)
            .ok_or_else(|| StatusError::UnknownGame(game_id.to_string()))?;

        if !current.can_transition_to(to) {
            return Err(StatusError::IllegalTransition {
                game: game_id.to_string(),
                from: *current,
                to,
            });
        }

        apply();
        let from = std::mem::replace(current, to);
        debug!("Status of {}: {} -> {}", game_id, from, to);

        Ok(StatusEvent {
            game_id: game_id.to_string(),
            from,
            to,
        })
    }

    pub(crate) fn notify(&self, event: &StatusEvent) {
        for observer in self.observers.read().iter() {
            observer(event);
        }
    }
}
