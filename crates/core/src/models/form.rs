use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tab::{CalculationMode, TabRecord};
use super::trade::{FieldIssue, FormField, TradeLevels};

/// State of the price input with respect to live quotes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum QuoteStatus {
    /// The user types the price by hand
    #[default]
    Manual,
    /// The price came from a provider
    Live { fetched_at: DateTime<Utc> },
    /// The last user-initiated fetch failed; reverts to `Manual` after a delay
    Failed { message: String },
}

/// The on-screen calculator form, bound to the active tab.
///
/// The UI adapter paints exactly what is in here. Input strings are kept as
/// typed; `results` is `None` whenever the results panel is hidden.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormFields {
    pub symbol: String,
    pub current_price: String,
    pub target_price: String,
    pub quantity: String,
    pub take_profit_percent: String,
    pub stop_loss_percent: String,
    pub auto_price_enabled: bool,
    pub calculation_mode: CalculationMode,

    pub results: Option<TradeLevels>,
    pub issues: Vec<FieldIssue>,
    pub quote_status: QuoteStatus,
}

impl FormFields {
    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Symbol => &self.symbol,
            FormField::CurrentPrice => &self.current_price,
            FormField::TargetPrice => &self.target_price,
            FormField::Quantity => &self.quantity,
            FormField::TakeProfitPercent => &self.take_profit_percent,
            FormField::StopLossPercent => &self.stop_loss_percent,
        }
    }

    pub fn set(&mut self, field: FormField, value: String) {
        let slot = match field {
            FormField::Symbol => &mut self.symbol,
            FormField::CurrentPrice => &mut self.current_price,
            FormField::TargetPrice => &mut self.target_price,
            FormField::Quantity => &mut self.quantity,
            FormField::TakeProfitPercent => &mut self.take_profit_percent,
            FormField::StopLossPercent => &mut self.stop_loss_percent,
        };
        *slot = value;
    }

    /// Copy every stored field of `record` onto the form. Derived state is left alone.
    pub fn fill_from(&mut self, record: &TabRecord) {
        self.symbol = record.symbol.clone();
        self.current_price = record.current_price.clone();
        self.target_price = record.target_price.clone();
        self.quantity = record.quantity.clone();
        self.take_profit_percent = record.take_profit_percent.clone();
        self.stop_loss_percent = record.stop_loss_percent.clone();
        self.auto_price_enabled = record.auto_price_enabled;
        self.calculation_mode = record.calculation_mode;
    }

    /// Write the form back into `record` verbatim, trimming only the symbol.
    pub fn write_into(&self, record: &mut TabRecord) {
        record.symbol = self.symbol.trim().to_string();
        record.current_price = self.current_price.clone();
        record.target_price = self.target_price.clone();
        record.quantity = self.quantity.clone();
        record.take_profit_percent = self.take_profit_percent.clone();
        record.stop_loss_percent = self.stop_loss_percent.clone();
        record.auto_price_enabled = self.auto_price_enabled;
        record.calculation_mode = self.calculation_mode;
    }

    /// The price the levels are measured from, per calculation mode.
    pub fn basis_price_input(&self) -> &str {
        match self.calculation_mode {
            CalculationMode::Current => &self.current_price,
            CalculationMode::Target => &self.target_price,
        }
    }

    /// Auto-pricing is wanted when the flag is on and a symbol is present.
    pub fn wants_auto_price(&self) -> bool {
        self.auto_price_enabled && !self.symbol.trim().is_empty()
    }
}
