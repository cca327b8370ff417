// src/registry.rs
use std::collections::HashSet;

use crate::backends::BackendSet;
use crate::error::RegistryError;
use crate::models::game::{
    BackendKind, GameInfo, LaunchMapping, OptionSpec, PresentationHint, SettingValue, SettingsSchema,
};

/// Static catalog of supported titles.
pub struct GameRegistry {
    games: Vec<GameInfo>,
}

fn text(value: &str) -> SettingValue {
    SettingValue::Text(value.to_string())
}

fn list(values: &[&str]) -> SettingValue {
    SettingValue::List(values.iter().map(|v| v.to_string()).collect())
}

fn quake3_game(id: &str, name: &str, masters: &[&str], protocol: i64, game_name: &str, binary: &str) -> GameInfo {
    let mut schema = SettingsSchema::new();
    schema.insert("path".into(), OptionSpec::new(text(""), PresentationHint::PathChooser));
    schema.insert("master_uri".into(), OptionSpec::new(list(masters), PresentationHint::MultilineEntry));
    schema.insert("protocol".into(), OptionSpec::new(SettingValue::Int(protocol), PresentationHint::SpinButton));
    schema.insert("master_game_name".into(), OptionSpec::new(text(game_name), PresentationHint::Entry));

    GameInfo {
        id: id.to_string(),
        name: name.to_string(),
        backend: BackendKind::Quake3,
        schema,
        launch: Some(LaunchMapping {
            binary_option: "path".to_string(),
            default_binary: binary.to_string(),
            connect_args: vec!["+connect".to_string(), "{host}".to_string()],
            password_args: vec!["+password".to_string(), "{password}".to_string()],
        }),
    }
}

fn source_game(id: &str, name: &str, app_id: u32) -> GameInfo {
    let mut schema = SettingsSchema::new();
    schema.insert("path".into(), OptionSpec::new(text(""), PresentationHint::PathChooser));
    schema.insert(
        "master_uri".into(),
        OptionSpec::new(list(&["hl2master.steampowered.com:27011"]), PresentationHint::MultilineEntry),
    );
    schema.insert(
        "filter".into(),
        OptionSpec::new(text(&format!("\\appid\\{}", app_id)), PresentationHint::Entry),
    );
    schema.insert("max_pages".into(), OptionSpec::new(SettingValue::Int(8), PresentationHint::SpinButton));

    GameInfo {
        id: id.to_string(),
        name: name.to_string(),
        backend: BackendKind::Source,
        schema,
        launch: Some(LaunchMapping {
            binary_option: "path".to_string(),
            default_binary: "steam".to_string(),
            connect_args: vec![
                "-applaunch".to_string(),
                app_id.to_string(),
                "+connect".to_string(),
                "{host}".to_string(),
            ],
            password_args: vec!["+password".to_string(), "{password}".to_string()],
        }),
    }
}

impl GameRegistry {
    pub fn new(games: Vec<GameInfo>) -> Self {
        Self { games }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            quake3_game("openarena", "OpenArena", &["dpmaster.deathmask.net:27950"], 71, "", "openarena"),
            quake3_game("q3", "Quake III Arena", &["master.ioquake3.org:27950"], 68, "", "ioquake3"),
            quake3_game(
                "urbanterror",
                "Urban Terror",
                &["master.urbanterror.info:27900", "master2.urbanterror.info:27900"],
                68,
                "",
                "urbanterror",
            ),
            quake3_game("xonotic", "Xonotic", &["dpmaster.deathmask.net:27950"], 3, "Xonotic", "xonotic"),
            source_game("tf2", "Team Fortress 2", 440),
            source_game("css", "Counter-Strike: Source", 240),
        ])
    }

    pub fn games(&self) -> &[GameInfo] {
        &self.games
    }

    /// Checks the catalog against the available backends and its own
    /// schemas, returning the validated games.
    pub fn build(self, backends: &BackendSet) -> Result<Vec<GameInfo>, RegistryError> {
        let mut ids = HashSet::new();
        for game in &self.games {
            if !ids.insert(game.id.as_str()) {
                return Err(RegistryError::DuplicateGame(game.id.clone()));
            }
            if !backends.supports(game.backend) {
                return Err(RegistryError::UnsupportedBackend {
                    game: game.id.clone(),
                    kind: game.backend,
                });
            }
            for (option, spec) in &game.schema {
                if spec.default.kind() != spec.kind {
                    return Err(RegistryError::InvalidDefault {
                        game: game.id.clone(),
                        option: option.clone(),
                        declared: spec.kind,
                        actual: spec.default.kind(),
                    });
                }
            }
        }
        Ok(self.games)
    }
}
