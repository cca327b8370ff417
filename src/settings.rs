// src/settings.rs
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::SettingsError;
use crate::models::game::Settings;
use crate::storage::memory::GameTable;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    games: BTreeMap<String, Settings>,
}

/// Applies stored per-game settings to the table. A missing file is not an
/// error. Entries the schema rejects are skipped. Returns how many options
/// were applied.
pub fn load(path: &Path, table: &GameTable) -> Result<usize, SettingsError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No settings at {}, using defaults", path.display());
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };
    let file: SettingsFile = serde_json::from_str(&text)?;

    let mut applied = 0;
    for (game_id, options) in file.games {
        for (option, value) in options {
            match table.set_setting(&game_id, &option, value) {
                Ok(()) => applied += 1,
                Err(e) => warn!("Ignoring stored setting: {}", e),
            }
        }
    }
    info!("Applied {} stored settings from {}", applied, path.display());
    Ok(applied)
}

pub fn save(path: &Path, table: &GameTable) -> Result<(), SettingsError> {
    let file = SettingsFile {
        games: table
            .game_ids()
            .into_iter()
            .filter_map(|id| table.settings(&id).map(|s| (id, s)))
            .collect(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::{BackendKind, GameInfo, OptionSpec, PresentationHint, SettingValue, SettingsSchema};

    fn table() -> GameTable {
        let mut schema = SettingsSchema::new();
        schema.insert(
            "protocol".into(),
            OptionSpec::new(SettingValue::Int(68), PresentationHint::SpinButton),
        );
        schema.insert(
            "path".into(),
            OptionSpec::new(SettingValue::Text(String::new()), PresentationHint::PathChooser),
        );
        GameTable::new(vec![GameInfo {
            id: "q3".into(),
            name: "Quake III Arena".into(),
            backend: BackendKind::Quake3,
            schema,
            launch: None,
        }])
    }

    #[test]
    fn test_missing_file_applies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let applied = load(&dir.path().join("absent.json"), &table()).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_save_then_load_into_fresh_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile").join("settings.json");

        let saved = table();
        saved.set_setting("q3", "protocol", SettingValue::Int(71)).unwrap();
        save(&path, &saved).unwrap();

        let fresh = table();
        assert_eq!(load(&path, &fresh).unwrap(), 2);
        assert_eq!(fresh.settings("q3").unwrap().get("protocol"), Some(&SettingValue::Int(71)));
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"games": {"q3": {"protocol": "seventy", "path": "/usr/bin/q3", "bogus": 1}, "nope": {"x": 1}}}"#,
        )
        .unwrap();

        let t = table();
        assert_eq!(load(&path, &t).unwrap(), 1);
        let settings = t.settings("q3").unwrap();
        assert_eq!(settings.get("protocol"), Some(&SettingValue::Int(68)));
        assert_eq!(settings.get("path"), Some(&SettingValue::Text("/usr/bin/q3".into())));
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(load(&path, &table()), Err(SettingsError::Parse(_))));
    }
}
