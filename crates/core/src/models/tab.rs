use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, immutable identifier of a tab.
///
/// Generated once at creation. Persisted ids are accepted verbatim on load,
/// so any non-empty string is a valid id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Generate a fresh, collision-free id.
    pub fn generate() -> Self {
        Self(format!("tab_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TabId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which price the derived levels are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationMode {
    /// Levels are relative to the current market price
    #[default]
    Current,
    /// Levels are relative to a user-entered target (entry) price
    Target,
}

impl std::fmt::Display for CalculationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculationMode::Current => write!(f, "Current price"),
            CalculationMode::Target => write!(f, "Target price"),
        }
    }
}

/// One saved calculator configuration.
///
/// Numeric inputs are kept as the strings the user typed so that partial
/// input such as `"12."` survives a reload untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub id: TabId,

    #[serde(default)]
    pub symbol: String,

    #[serde(default)]
    pub current_price: String,

    #[serde(default)]
    pub target_price: String,

    #[serde(default)]
    pub quantity: String,

    #[serde(default)]
    pub take_profit_percent: String,

    #[serde(default)]
    pub stop_loss_percent: String,

    #[serde(default)]
    pub auto_price_enabled: bool,

    #[serde(default)]
    pub calculation_mode: CalculationMode,

    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TabRecord {
    /// A blank record with a fresh id.
    pub fn new() -> Self {
        Self {
            id: TabId::generate(),
            symbol: String::new(),
            current_price: String::new(),
            target_price: String::new(),
            quantity: String::new(),
            take_profit_percent: String::new(),
            stop_loss_percent: String::new(),
            auto_price_enabled: false,
            calculation_mode: CalculationMode::Current,
            created_at: Utc::now(),
        }
    }

    /// Label shown on the tab strip. `position` is zero-based.
    pub fn display_label(&self, position: usize) -> String {
        label_for(&self.symbol, position)
    }

    /// Uppercased, trimmed symbol, or `None` when the symbol is blank.
    pub fn normalized_symbol(&self) -> Option<String> {
        normalize_symbol(&self.symbol)
    }

    /// `true` if any user input has been entered into this record.
    pub fn has_data(&self) -> bool {
        [
            &self.symbol,
            &self.current_price,
            &self.target_price,
            &self.quantity,
            &self.take_profit_percent,
            &self.stop_loss_percent,
        ]
        .iter()
        .any(|s| !s.trim().is_empty())
    }
}

impl Default for TabRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbols are compared case-insensitively and without surrounding whitespace.
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

pub(crate) fn label_for(symbol: &str, position: usize) -> String {
    normalize_symbol(symbol).unwrap_or_else(|| format!("Tab {}", position + 1))
}

/// A tab as presented on the tab strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSummary {
    pub id: TabId,
    pub label: String,
    pub active: bool,
    pub auto_price_enabled: bool,
}
