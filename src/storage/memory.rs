// src/storage/memory.rs
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::SettingsError;
use crate::models::game::{GameInfo, QueryStatus, SettingValue, Settings};
use crate::models::server::ServerRecord;

/// Everything known about one game. Slots are immutable once published;
/// writers build a replacement and swap the `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct GameSlot {
    pub info: Arc<GameInfo>,
    pub settings: Settings,
    pub servers: Arc<Vec<ServerRecord>>,
    pub status: QueryStatus,
}

impl GameSlot {
    fn new(info: GameInfo) -> Self {
        let settings = info.default_settings();
        Self {
            info: Arc::new(info),
            settings,
            servers: Arc::new(Vec::new()),
            status: QueryStatus::Unqueried,
        }
    }
}

/// Read-only view of the whole table at one point in time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableSnapshot {
    pub games: BTreeMap<String, Arc<GameSlot>>,
}

impl TableSnapshot {
    pub fn get(&self, game_id: &str) -> Option<&GameSlot> {
        self.games.get(game_id).map(|slot| slot.as_ref())
    }

    pub fn status(&self, game_id: &str) -> Option<QueryStatus> {
        self.get(game_id).map(|slot| slot.status)
    }

    pub fn servers(&self, game_id: &str) -> &[ServerRecord] {
        self.get(game_id)
            .map(|slot| slot.servers.as_slice())
            .unwrap_or(&[])
    }
}

pub struct GameTable {
    slots: DashMap<String, Arc<GameSlot>>,
}

impl GameTable {
    pub fn new(games: impl IntoIterator<Item = GameInfo>) -> Self {
        let slots = DashMap::new();
        for info in games {
            slots.insert(info.id.clone(), Arc::new(GameSlot::new(info)));
        }
        Self { slots }
    }

    pub fn get(&self, game_id: &str) -> Option<Arc<GameSlot>> {
        self.slots.get(game_id).map(|r| Arc::clone(r.value()))
    }

    pub fn game_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            games: self
                .slots
                .iter()
                .map(|r| (r.key().clone(), Arc::clone(r.value())))
                .collect(),
        }
    }

    pub fn settings(&self, game_id: &str) -> Option<Settings> {
        self.get(game_id).map(|slot| slot.settings.clone())
    }

    /// Validates `value` against the game's schema and publishes a new slot.
    pub fn set_setting(
        &self,
        game_id: &str,
        option: &str,
        value: SettingValue,
    ) -> Result<(), SettingsError> {
        let mut entry = self
            .slots
            .get_mut(game_id)
            .ok_or_else(|| SettingsError::UnknownGame(game_id.to_string()))?;

        let spec = entry.info.schema.get(option).ok_or_else(|| SettingsError::UnknownOption {
            game: game_id.to_string(),
            option: option.to_string(),
        })?;
        if !spec.accepts(&value) {
            return Err(SettingsError::TypeMismatch {
                game: game_id.to_string(),
                option: option.to_string(),
                expected: spec.kind,
                actual: value.kind(),
            });
        }

        let current: &GameSlot = entry.value();
        let mut next = current.clone();
        next.settings.insert(option.to_string(), value);
        *entry.value_mut() = Arc::new(next);
        Ok(())
    }

    pub(crate) fn set_status(&self, game_id: &str, status: QueryStatus) -> bool {
        self.replace(game_id, |slot| GameSlot {
            status,
            ..slot.clone()
        })
    }

    /// Publishes the outcome of a cycle: list and status change together.
    pub(crate) fn complete_cycle(
        &self,
        game_id: &str,
        servers: Arc<Vec<ServerRecord>>,
        status: QueryStatus,
    ) -> bool {
        self.replace(game_id, |slot| GameSlot {
            servers,
            status,
            ..slot.clone()
        })
    }

    fn replace(&self, game_id: &str, f: impl FnOnce(&GameSlot) -> GameSlot) -> bool {
        match self.slots.get_mut(game_id) {
            Some(mut entry) => {
                let current: &GameSlot = entry.value();
                let next = f(current);
                *entry.value_mut() = Arc::new(next);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::{BackendKind, OptionSpec, PresentationHint, SettingsSchema};

    fn game(id: &str) -> GameInfo {
        let mut schema = SettingsSchema::new();
        schema.insert(
            "protocol".to_string(),
            OptionSpec::new(SettingValue::Int(68), PresentationHint::SpinButton),
        );
        GameInfo {
            id: id.to_string(),
            name: id.to_uppercase(),
            backend: BackendKind::Quake3,
            schema,
            launch: None,
        }
    }

    fn record(port: u16) -> ServerRecord {
        ServerRecord {
            host: format!("10.0.0.1:{}", port).parse().unwrap(),
            password: false,
            player_count: 1,
            player_limit: 8,
            ping: Some(20),
            country: "unknown".to_string(),
            name: "srv".to_string(),
            game_id: "q3".to_string(),
            game_mod: String::new(),
            game_type: String::new(),
            terrain: "q3dm17".to_string(),
        }
    }

    #[test]
    fn test_new_slots_start_unqueried_with_defaults() {
        let table = GameTable::new(vec![game("q3"), game("oa")]);
        assert_eq!(table.game_ids(), vec!["oa".to_string(), "q3".to_string()]);

        let slot = table.get("q3").unwrap();
        assert_eq!(slot.status, QueryStatus::Unqueried);
        assert!(slot.servers.is_empty());
        assert_eq!(slot.settings.get("protocol"), Some(&SettingValue::Int(68)));
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_writes() {
        let table = GameTable::new(vec![game("q3")]);
        let before = table.snapshot();

        table.complete_cycle("q3", Arc::new(vec![record(27960)]), QueryStatus::Ready);

        assert_eq!(before.status("q3"), Some(QueryStatus::Unqueried));
        assert!(before.servers("q3").is_empty());

        let after = table.snapshot();
        assert_eq!(after.status("q3"), Some(QueryStatus::Ready));
        assert_eq!(after.servers("q3").len(), 1);
    }

    #[test]
    fn test_set_status_keeps_previous_list() {
        let table = GameTable::new(vec![game("q3")]);
        table.complete_cycle("q3", Arc::new(vec![record(1), record(2)]), QueryStatus::Ready);
        assert!(table.set_status("q3", QueryStatus::Working));

        let slot = table.get("q3").unwrap();
        assert_eq!(slot.status, QueryStatus::Working);
        assert_eq!(slot.servers.len(), 2);
        assert!(!table.set_status("missing", QueryStatus::Working));
    }

    #[test]
    fn test_set_setting_validates_against_schema() {
        let table = GameTable::new(vec![game("q3")]);

        table.set_setting("q3", "protocol", SettingValue::Int(71)).unwrap();
        assert_eq!(
            table.settings("q3").unwrap().get("protocol"),
            Some(&SettingValue::Int(71))
        );

        assert!(matches!(
            table.set_setting("q3", "protocol", SettingValue::Text("71".into())),
            Err(SettingsError::TypeMismatch { .. })
        ));
        assert!(matches!(
            table.set_setting("q3", "nope", SettingValue::Int(1)),
            Err(SettingsError::UnknownOption { .. })
        ));
        assert!(matches!(
            table.set_setting("zz", "protocol", SettingValue::Int(1)),
            Err(SettingsError::UnknownGame(_))
        ));
    }
}
