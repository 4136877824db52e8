use serde::{Deserialize, Serialize};

/// Levels and amounts derived from a basis price, a quantity and the
/// take-profit / stop-loss percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub basis_price: f64,
    pub quantity: f64,
    pub take_profit_percent: f64,
    pub stop_loss_percent: f64,
    pub tp_price: f64,
    pub sl_price: f64,
    pub investment: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub ratio: RiskReward,
}

/// Risk/reward expressed as `1 : reward-per-unit-of-risk`.
///
/// `max_loss == 0` has no finite ratio, so it is represented explicitly
/// instead of carrying an infinity or NaN to the display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RiskReward {
    /// Finite ratio `max_profit / max_loss`
    Ratio(f64),
    /// No risk but positive reward
    Unbounded,
    /// Neither risk nor reward
    Undefined,
}

impl RiskReward {
    pub fn from_amounts(max_profit: f64, max_loss: f64) -> Self {
        if max_loss > 0.0 {
            let ratio = max_profit / max_loss;
            if ratio.is_finite() {
                return RiskReward::Ratio(ratio);
            }
            return RiskReward::Unbounded;
        }
        if max_profit > 0.0 {
            RiskReward::Unbounded
        } else {
            RiskReward::Undefined
        }
    }

    /// The finite value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            RiskReward::Ratio(r) => Some(*r),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskReward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskReward::Ratio(r) => write!(f, "1:{r:.1}"),
            RiskReward::Unbounded => write!(f, "1:∞"),
            RiskReward::Undefined => write!(f, "N/A"),
        }
    }
}

/// An input on the calculator form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormField {
    Symbol,
    CurrentPrice,
    TargetPrice,
    Quantity,
    TakeProfitPercent,
    StopLossPercent,
}

impl std::fmt::Display for FormField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormField::Symbol => write!(f, "Symbol"),
            FormField::CurrentPrice => write!(f, "Current price"),
            FormField::TargetPrice => write!(f, "Target price"),
            FormField::Quantity => write!(f, "Quantity"),
            FormField::TakeProfitPercent => write!(f, "Take profit %"),
            FormField::StopLossPercent => write!(f, "Stop loss %"),
        }
    }
}

/// A validation message attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: FormField,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: FormField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
