// src/models/game.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Protocol family a game is queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Quake3,
    Source,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quake3 => write!(f, "quake3"),
            Self::Source => write!(f, "source"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Unqueried,
    Working,
    Ready,
    Error,
}

impl QueryStatus {
    /// Edges of the per-game query state machine.
    pub fn can_transition_to(self, next: QueryStatus) -> bool {
        use QueryStatus::*;
        matches!(
            (self, next),
            (Unqueried | Ready | Error, Working) | (Working, Ready | Error)
        )
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unqueried => "unqueried",
            Self::Working => "working",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Bool,
    Int,
    Text,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Bool(_) => SettingKind::Bool,
            Self::Int(_) => SettingKind::Int,
            Self::Text(_) => SettingKind::Text,
            Self::List(_) => SettingKind::List,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }
}

/// How a settings dialog should present an option. Carried for the
/// presentation layer only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationHint {
    CheckButton,
    SpinButton,
    Entry,
    MultilineEntry,
    PathChooser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub kind: SettingKind,
    pub default: SettingValue,
    pub hint: PresentationHint,
}

impl OptionSpec {
    pub fn new(default: SettingValue, hint: PresentationHint) -> Self {
        Self {
            kind: default.kind(),
            default,
            hint,
        }
    }

    pub fn accepts(&self, value: &SettingValue) -> bool {
        value.kind() == self.kind
    }
}

pub type SettingsSchema = BTreeMap<String, OptionSpec>;
pub type Settings = BTreeMap<String, SettingValue>;

/// Command line shape used to hand a server address to the game client.
/// `{host}` and `{password}` are substituted in the argument templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchMapping {
    pub binary_option: String,
    pub default_binary: String,
    pub connect_args: Vec<String>,
    pub password_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: String,
    pub name: String,
    pub backend: BackendKind,
    pub schema: SettingsSchema,
    pub launch: Option<LaunchMapping>,
}

impl GameInfo {
    pub fn default_settings(&self) -> Settings {
        self.schema
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect()
    }
}
