use crate::models::form::FormFields;
use crate::models::tab::{normalize_symbol, CalculationMode};
use crate::models::trade::{FieldIssue, FormField, RiskReward, TradeLevels};

/// Outcome of evaluating the form.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Not enough input yet; the results panel stays hidden
    Hidden,
    /// Input present but unusable; messages per field
    Invalid(Vec<FieldIssue>),
    Ready(TradeLevels),
}

/// Derive take-profit / stop-loss levels and the money at stake.
///
/// Amounts are computed from the percentages directly rather than from the
/// rounded level prices, so `max_profit` and `max_loss` are exact multiples
/// of the investment.
pub fn compute_levels(
    basis_price: f64,
    quantity: f64,
    take_profit_percent: f64,
    stop_loss_percent: f64,
) -> TradeLevels {
    let tp_move = basis_price * take_profit_percent / 100.0;
    let sl_move = basis_price * stop_loss_percent / 100.0;
    let investment = basis_price * quantity;
    let max_profit = investment * take_profit_percent / 100.0;
    let max_loss = investment * stop_loss_percent / 100.0;

    TradeLevels {
        basis_price,
        quantity,
        take_profit_percent,
        stop_loss_percent,
        tp_price: basis_price + tp_move,
        sl_price: basis_price - sl_move,
        investment,
        max_profit,
        max_loss,
        ratio: RiskReward::from_amounts(max_profit, max_loss),
    }
}

/// Validate the live form and compute levels when possible.
pub fn evaluate(fields: &FormFields) -> Evaluation {
    let quantity_raw = fields.quantity.trim();
    let current_raw = fields.current_price.trim();
    let target_raw = fields.target_price.trim();

    let (basis_field, basis_raw) = match fields.calculation_mode {
        CalculationMode::Current => (FormField::CurrentPrice, current_raw),
        CalculationMode::Target => (FormField::TargetPrice, target_raw),
    };

    if quantity_raw.is_empty() {
        return Evaluation::Hidden;
    }
    if basis_raw.is_empty() {
        // Target mode with a price already present: the missing target is the problem.
        if fields.calculation_mode == CalculationMode::Target && !current_raw.is_empty() {
            return Evaluation::Invalid(vec![FieldIssue::new(
                FormField::TargetPrice,
                "Enter a target price to calculate in target mode",
            )]);
        }
        return Evaluation::Hidden;
    }

    let mut issues = Vec::new();
    let basis = positive(basis_field, basis_raw, &mut issues);
    let quantity = positive(FormField::Quantity, quantity_raw, &mut issues);
    let tp = percentage(FormField::TakeProfitPercent, &fields.take_profit_percent, &mut issues);
    let sl = percentage(FormField::StopLossPercent, &fields.stop_loss_percent, &mut issues);

    match (basis, quantity, tp, sl) {
        (Some(basis), Some(quantity), Some(tp), Some(sl)) => {
            Evaluation::Ready(compute_levels(basis, quantity, tp, sl))
        }
        _ => Evaluation::Invalid(issues),
    }
}

fn parse(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn positive(field: FormField, raw: &str, issues: &mut Vec<FieldIssue>) -> Option<f64> {
    match parse(raw) {
        Some(v) if v > 0.0 => Some(v),
        Some(_) => {
            issues.push(FieldIssue::new(field, format!("{field} must be greater than zero")));
            None
        }
        None => {
            issues.push(FieldIssue::new(field, format!("{field} must be a number")));
            None
        }
    }
}

/// Blank percentages count as zero.
fn percentage(field: FormField, raw: &str, issues: &mut Vec<FieldIssue>) -> Option<f64> {
    if raw.trim().is_empty() {
        return Some(0.0);
    }
    match parse(raw) {
        Some(v) if v >= 0.0 => Some(v),
        Some(_) => {
            issues.push(FieldIssue::new(field, format!("{field} cannot be negative")));
            None
        }
        None => {
            issues.push(FieldIssue::new(field, format!("{field} must be a number")));
            None
        }
    }
}

/// Two-decimal rendering used everywhere a price or amount is shown.
pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

/// Plain-text summary for the clipboard.
pub fn export_summary(symbol: &str, mode: CalculationMode, levels: &TradeLevels) -> String {
    let title = normalize_symbol(symbol).unwrap_or_else(|| "Untitled".to_string());
    let mut out = String::new();
    out.push_str(&format!("Trade plan: {title}\n"));
    out.push_str(&format!("Basis: {mode}\n"));
    out.push_str(&format!("Entry price: {}\n", format_amount(levels.basis_price)));
    out.push_str(&format!("Quantity: {}\n", levels.quantity));
    out.push_str(&format!("Investment: {}\n", format_amount(levels.investment)));
    out.push_str(&format!(
        "Take profit (+{}%): {} | max profit {}\n",
        levels.take_profit_percent,
        format_amount(levels.tp_price),
        format_amount(levels.max_profit)
    ));
    out.push_str(&format!(
        "Stop loss (-{}%): {} | max loss {}\n",
        levels.stop_loss_percent,
        format_amount(levels.sl_price),
        format_amount(levels.max_loss)
    ));
    out.push_str(&format!("Risk/reward: {}\n", levels.ratio));
    out
}
