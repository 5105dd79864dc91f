//! Bot configuration rows.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::BotType;

/// Opaque bot identifier assigned by the configuration store.
pub type BotId = i64;

/// One configured strategy instance.
///
/// The core only ever reads these; creation and updates happen through the
/// configuration-management surface (or the seed list in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfiguration {
    pub id: BotId,

    /// Owning user. Informational only.
    #[serde(default)]
    pub owner_id: String,

    /// Strategy family as stored, e.g. `"momentum"`. Parsed with [`BotType`].
    pub bot_type: String,

    /// Strategy-specific parameters. Always contains `symbol`.
    #[serde(default)]
    pub settings: Map<String, Value>,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl BotConfiguration {
    pub fn new(id: BotId, bot_type: impl Into<String>, settings: Value) -> Self {
        let settings = match settings {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id,
            owner_id: String::new(),
            bot_type: bot_type.into(),
            settings,
            is_active: true,
        }
    }

    /// Trading symbol from the settings map, upper-cased.
    pub fn symbol(&self) -> Option<String> {
        self.settings
            .get("symbol")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
    }

    /// Parse `bot_type`; the error carries the unrecognized value.
    pub fn kind(&self) -> Result<BotType, String> {
        self.bot_type.parse()
    }

    pub fn settings_value(&self) -> Value {
        Value::Object(self.settings.clone())
    }
}
