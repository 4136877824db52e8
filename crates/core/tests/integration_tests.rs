// ═══════════════════════════════════════════════════════════════════
// Integration Tests — TradePlanner facade: tab lifecycle, form sync,
// debounced persistence, active-tab polling, reload
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trade_planner_core::errors::CoreError;
use trade_planner_core::models::form::QuoteStatus;
use trade_planner_core::models::quote::Quote;
use trade_planner_core::models::settings::PlannerSettings;
use trade_planner_core::models::tab::{CalculationMode, TabId};
use trade_planner_core::models::trade::FormField;
use trade_planner_core::providers::registry::QuoteProviderRegistry;
use trade_planner_core::providers::traits::QuoteProvider;
use trade_planner_core::services::form_sync::SyncState;
use trade_planner_core::services::poller::PollerState;
use trade_planner_core::storage::memory::MemoryStore;
use trade_planner_core::storage::traits::KeyValueStore;
use trade_planner_core::{CloseOutcome, TradePlanner};

// ═══════════════════════════════════════════════════════════════════
// Mock Provider
// ═══════════════════════════════════════════════════════════════════

/// Shared handle to the mock's price table and call log.
#[derive(Clone, Default)]
struct MockMarket {
    prices: Arc<Mutex<HashMap<String, f64>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockMarket {
    fn with(prices: &[(&str, f64)]) -> Self {
        let market = Self::default();
        for (s, p) in prices {
            market.set_price(s, *p);
        }
        market
    }

    fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    fn remove_price(&self, symbol: &str) {
        self.prices.lock().unwrap().remove(symbol);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn provider(&self) -> MockProvider {
        MockProvider {
            market: self.clone(),
        }
    }
}

struct MockProvider {
    market: MockMarket,
}

#[async_trait]
impl QuoteProvider for MockProvider {
    fn name(&self) -> &str {
        "MockProvider"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        self.market.calls.lock().unwrap().push(symbol.to_string());
        let price = self.market.prices.lock().unwrap().get(symbol).copied();
        price.map(Quote::from_price).ok_or_else(|| CoreError::Api {
            provider: "MockProvider".into(),
            message: format!("Symbol {symbol} not found"),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════
// Limited Store
// ═══════════════════════════════════════════════════════════════════

/// Memory store that accepts only `budget` more writes.
struct LimitedStore {
    inner: MemoryStore,
    budget: Arc<AtomicUsize>,
}

impl KeyValueStore for LimitedStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), CoreError> {
        if self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            return Err(CoreError::Storage("write budget exhausted".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<bool, CoreError> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

/// Cache disabled so every poll cycle reaches the provider.
fn test_settings() -> PlannerSettings {
    PlannerSettings {
        quote_cache_ttl_secs: 0,
        ..PlannerSettings::default()
    }
}

fn planner_with(market: &MockMarket, settings: PlannerSettings) -> TradePlanner {
    let mut registry = QuoteProviderRegistry::new();
    registry.register(Box::new(market.provider()));
    TradePlanner::with_registry(Box::new(MemoryStore::new()), settings, registry).unwrap()
}

fn planner(market: &MockMarket) -> TradePlanner {
    planner_with(market, test_settings())
}

fn planner_on(storage: Box<dyn KeyValueStore>, market: &MockMarket) -> TradePlanner {
    let mut registry = QuoteProviderRegistry::new();
    registry.register(Box::new(market.provider()));
    TradePlanner::with_registry(storage, test_settings(), registry).unwrap()
}

fn fill(p: &mut TradePlanner, symbol: &str, price: &str, qty: &str, tp: &str, sl: &str) {
    p.edit_field(FormField::Symbol, symbol);
    p.edit_field(FormField::CurrentPrice, price);
    p.edit_field(FormField::Quantity, qty);
    p.edit_field(FormField::TakeProfitPercent, tp);
    p.edit_field(FormField::StopLossPercent, sl);
    p.flush().unwrap();
}

fn tab_ids(p: &TradePlanner) -> Vec<TabId> {
    p.tabs().iter().map(|t| t.id.clone()).collect()
}

fn assert_invariants(p: &TradePlanner) {
    let ids = tab_ids(p);
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "tab ids must be unique");
    assert!(!ids.is_empty(), "at least one tab must exist");
    assert!(ids.len() <= p.settings().max_tabs);
    let active = p.active_tab_id().expect("an active tab must exist");
    assert!(ids.contains(active), "active id must name a tab");
}

// ═══════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════

mod initialization {
    use super::*;

    #[test]
    fn empty_storage_gets_one_default_tab() {
        let market = MockMarket::default();
        let p = planner(&market);
        assert_eq!(p.tabs().len(), 1);
        assert_invariants(&p);
        assert_eq!(p.form().symbol, "");
        assert!(p.form().results.is_none());
        assert_eq!(p.poller_state(), PollerState::Idle);
        assert!(p.storage().get("stockTabs").is_some());
        assert_eq!(
            p.storage().get("activeTabId").as_deref(),
            Some(p.active_tab_id().unwrap().as_str())
        );
    }

    #[test]
    fn default_tab_is_labelled_by_position() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.create_tab().unwrap();
        let labels: Vec<String> = p.tab_summaries().into_iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["Tab 1", "Tab 2"]);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = PlannerSettings {
            max_tabs: 0,
            ..PlannerSettings::default()
        };
        let result = TradePlanner::with_registry(
            Box::new(MemoryStore::new()),
            settings,
            QuoteProviderRegistry::new(),
        );
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn orphaned_quotes_are_swept_at_startup() {
        let mut storage = MemoryStore::new();
        storage
            .set(
                "stockTabs",
                r#"[{"id":"a","symbol":"aapl","createdAt":1700000000000}]"#.into(),
            )
            .unwrap();
        storage.set("activeTabId", "a".into()).unwrap();
        storage
            .set("stockPrice_AAPL", r#"{"price":190.0,"fetchedAt":1700000000000}"#.into())
            .unwrap();
        storage
            .set("stockPrice_MSFT", r#"{"price":410.0,"fetchedAt":1700000000000}"#.into())
            .unwrap();
        storage.set("theme", "dark".into()).unwrap();

        let market = MockMarket::default();
        let p = planner_on(Box::new(storage), &market);
        assert!(p.storage().get("stockPrice_AAPL").is_some());
        assert!(p.storage().get("stockPrice_MSFT").is_none());
        assert_eq!(p.storage().get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn dangling_active_pointer_selects_first_tab() {
        let mut storage = MemoryStore::new();
        storage
            .set(
                "stockTabs",
                r#"[{"id":"a","createdAt":1},{"id":"b","createdAt":2}]"#.into(),
            )
            .unwrap();
        storage.set("activeTabId", "gone".into()).unwrap();

        let market = MockMarket::default();
        let p = planner_on(Box::new(storage), &market);
        assert_eq!(p.active_tab_id().unwrap().as_str(), "a");
        assert_eq!(p.storage().get("activeTabId").as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn restored_auto_priced_tab_starts_polling() {
        let mut storage = MemoryStore::new();
        storage
            .set(
                "stockTabs",
                r#"[{"id":"a","symbol":"NVDA","autoPriceEnabled":true,"createdAt":1}]"#.into(),
            )
            .unwrap();
        storage.set("activeTabId", "a".into()).unwrap();

        let market = MockMarket::with(&[("NVDA", 120.0)]);
        let mut p = planner_on(Box::new(storage), &market);
        assert!(matches!(p.poller_state(), PollerState::Polling { .. }));
        p.tick().await.unwrap();
        assert_eq!(market.calls(), vec!["NVDA"]);
        assert_eq!(p.form().current_price, "120.00");
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tab Lifecycle
// ═══════════════════════════════════════════════════════════════════

mod tab_lifecycle {
    use super::*;

    #[test]
    fn create_makes_new_tab_active_with_blank_form() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        fill(&mut p, "AAPL", "190", "5", "10", "5");
        let first = p.active_tab_id().unwrap().clone();

        let second = p.create_tab().unwrap();
        assert_ne!(first, second);
        assert_eq!(p.active_tab_id(), Some(&second));
        assert_eq!(p.form().symbol, "");
        assert_eq!(p.form().current_price, "");
        assert_eq!(p.form().calculation_mode, CalculationMode::Current);
        assert!(p.form().results.is_none());
        assert_invariants(&p);
    }

    #[test]
    fn create_flushes_unsaved_edits_of_previous_tab() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let first = p.active_tab_id().unwrap().clone();
        p.edit_field(FormField::Symbol, "  msft ");
        p.edit_field(FormField::Quantity, "3");
        // No flush and no tick: the debounce has not fired yet.
        p.create_tab().unwrap();

        let saved = p.tabs().iter().find(|t| t.id == first).unwrap();
        assert_eq!(saved.symbol, "msft");
        assert_eq!(saved.quantity, "3");
    }

    #[test]
    fn create_at_limit_is_refused_and_store_unchanged() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        for _ in 1..20 {
            p.create_tab().unwrap();
        }
        let before = tab_ids(&p);
        let active = p.active_tab_id().cloned();
        let persisted = p.storage().get("stockTabs");

        let err = p.create_tab().unwrap_err();
        assert!(matches!(err, CoreError::TabLimitReached(20)));
        assert_eq!(tab_ids(&p), before);
        assert_eq!(p.active_tab_id().cloned(), active);
        assert_eq!(p.storage().get("stockTabs"), persisted);
    }

    #[test]
    fn activate_unknown_tab_is_a_logged_no_op() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let active = p.active_tab_id().cloned();
        assert!(!p.activate_tab(&TabId::from("nope")).unwrap());
        assert_eq!(p.active_tab_id().cloned(), active);
    }

    #[test]
    fn activate_current_tab_is_a_no_op() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let id = p.active_tab_id().unwrap().clone();
        assert!(!p.activate_tab(&id).unwrap());
    }

    #[test]
    fn activate_round_trip_restores_field_values() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let a = p.active_tab_id().unwrap().clone();
        p.edit_field(FormField::Symbol, "AAPL");
        p.edit_field(FormField::CurrentPrice, "190.5");
        p.edit_field(FormField::TargetPrice, "185.");
        p.edit_field(FormField::Quantity, "12");
        p.edit_field(FormField::TakeProfitPercent, "7");
        p.edit_field(FormField::StopLossPercent, "");
        p.set_calculation_mode(CalculationMode::Target).unwrap();
        let before = p.form().clone();

        let b = p.create_tab().unwrap();
        p.edit_field(FormField::Symbol, "TSLA");
        p.edit_field(FormField::Quantity, "1");

        assert!(p.activate_tab(&a).unwrap());
        assert_eq!(p.form().symbol, before.symbol);
        assert_eq!(p.form().current_price, before.current_price);
        assert_eq!(p.form().target_price, "185.");
        assert_eq!(p.form().quantity, before.quantity);
        assert_eq!(p.form().take_profit_percent, before.take_profit_percent);
        assert_eq!(p.form().stop_loss_percent, "");
        assert_eq!(p.form().calculation_mode, CalculationMode::Target);
        assert_eq!(p.form().results, before.results);

        assert!(p.activate_tab(&b).unwrap());
        assert_eq!(p.form().symbol, "TSLA");
        assert_eq!(p.form().quantity, "1");
        assert_eq!(p.form().calculation_mode, CalculationMode::Current);
    }

    #[test]
    fn close_last_tab_is_refused() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let id = p.active_tab_id().unwrap().clone();
        let err = p.close_tab(&id, |_| true).unwrap_err();
        assert!(matches!(err, CoreError::LastTab));
        assert_eq!(tab_ids(&p), vec![id]);
    }

    #[test]
    fn close_unknown_tab_is_an_error() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.create_tab().unwrap();
        let err = p.close_tab(&TabId::from("missing"), |_| true).unwrap_err();
        assert!(matches!(err, CoreError::TabNotFound(_)));
    }

    #[test]
    fn close_blank_tab_does_not_ask() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let blank = p.create_tab().unwrap();
        let outcome = p
            .close_tab(&blank, |_| panic!("blank tab must not prompt"))
            .unwrap();
        assert_eq!(outcome, CloseOutcome::Closed);
        assert_eq!(p.tabs().len(), 1);
    }

    #[test]
    fn declined_confirmation_keeps_tab() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        fill(&mut p, "AAPL", "190", "1", "", "");
        let a = p.active_tab_id().unwrap().clone();
        p.create_tab().unwrap();
        let before = tab_ids(&p);

        let mut asked = String::new();
        let outcome = p
            .close_tab(&a, |msg| {
                asked = msg.to_string();
                false
            })
            .unwrap();
        assert_eq!(outcome, CloseOutcome::Cancelled);
        assert!(asked.contains("AAPL"));
        assert_eq!(tab_ids(&p), before);
    }

    #[test]
    fn closing_active_tab_selects_left_neighbour() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.create_tab().unwrap();
        p.create_tab().unwrap();
        let ids = tab_ids(&p);
        p.activate_tab(&ids[1]).unwrap();

        p.close_tab(&ids[1], |_| true).unwrap();
        assert_eq!(p.active_tab_id(), Some(&ids[0]));
        assert_invariants(&p);
    }

    #[test]
    fn closing_first_active_tab_selects_new_first() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.create_tab().unwrap();
        let ids = tab_ids(&p);
        p.activate_tab(&ids[0]).unwrap();

        p.close_tab(&ids[0], |_| true).unwrap();
        assert_eq!(p.active_tab_id(), Some(&ids[1]));
    }

    #[test]
    fn closing_inactive_tab_keeps_active_and_form() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let a = p.active_tab_id().unwrap().clone();
        p.create_tab().unwrap();
        p.activate_tab(&a).unwrap();
        p.edit_field(FormField::Quantity, "9");

        let other = tab_ids(&p).into_iter().find(|id| *id != a).unwrap();
        p.close_tab(&other, |_| true).unwrap();
        assert_eq!(p.active_tab_id(), Some(&a));
        assert_eq!(p.form().quantity, "9");
    }

    #[test]
    fn reorder_moves_tab_and_keeps_active() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.create_tab().unwrap();
        p.create_tab().unwrap();
        let ids = tab_ids(&p);
        let active = p.active_tab_id().cloned();

        assert!(p.reorder_tabs(&ids[2], &ids[0]).unwrap());
        assert_eq!(tab_ids(&p), vec![ids[2].clone(), ids[0].clone(), ids[1].clone()]);
        assert_eq!(p.active_tab_id().cloned(), active);

        let persisted: Vec<serde_json::Value> =
            serde_json::from_str(&p.storage().get("stockTabs").unwrap()).unwrap();
        assert_eq!(persisted[0]["id"], ids[2].as_str());
    }

    #[test]
    fn reorder_with_missing_or_same_ids_is_a_no_op() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.create_tab().unwrap();
        let ids = tab_ids(&p);
        assert!(!p.reorder_tabs(&ids[0], &ids[0]).unwrap());
        assert!(!p.reorder_tabs(&ids[0], &TabId::from("x")).unwrap());
        assert!(!p.reorder_tabs(&TabId::from("x"), &ids[0]).unwrap());
        assert_eq!(tab_ids(&p), ids);
    }

    #[test]
    fn clear_all_declined_changes_nothing() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        fill(&mut p, "AAPL", "190", "1", "", "");
        p.create_tab().unwrap();
        let before = tab_ids(&p);

        let mut asked = String::new();
        assert!(!p
            .clear_all(|msg| {
                asked = msg.to_string();
                false
            })
            .unwrap());
        assert!(asked.contains("cannot be undone"));
        assert_eq!(tab_ids(&p), before);
    }

    #[test]
    fn clear_all_without_data_uses_mild_wording() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let mut asked = String::new();
        p.clear_all(|msg| {
            asked = msg.to_string();
            false
        })
        .unwrap();
        assert_eq!(asked, "Reset all tabs?");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_restores_single_blank_tab_and_evicts_quotes() {
        let market = MockMarket::with(&[("AAPL", 190.0), ("MSFT", 410.0)]);
        let mut p = planner(&market);
        fill(&mut p, "AAPL", "", "1", "", "");
        p.refresh_quote().await.unwrap();
        p.create_tab().unwrap();
        fill(&mut p, "MSFT", "", "1", "", "");
        p.refresh_quote().await.unwrap();
        let old = tab_ids(&p);

        assert!(p.clear_all(|_| true).unwrap());
        assert_eq!(p.tabs().len(), 1);
        assert!(!old.contains(p.active_tab_id().unwrap()));
        assert_eq!(p.form().symbol, "");
        assert!(p.storage().get("stockPrice_AAPL").is_none());
        assert!(p.storage().get("stockPrice_MSFT").is_none());
        assert_invariants(&p);
    }

    #[test]
    fn failed_clear_all_keeps_existing_tabs() {
        let market = MockMarket::default();
        let budget = Arc::new(AtomicUsize::new(usize::MAX));
        let store = LimitedStore {
            inner: MemoryStore::new(),
            budget: budget.clone(),
        };
        let mut p = planner_on(Box::new(store), &market);
        fill(&mut p, "AAPL", "190", "1", "", "");
        p.create_tab().unwrap();
        let before = tab_ids(&p);
        let active = p.active_tab_id().cloned();

        // Enough for flushing the active tab, not for writing the reset.
        budget.store(2, Ordering::SeqCst);
        let err = p.clear_all(|_| true).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(tab_ids(&p), before);
        assert_eq!(p.active_tab_id().cloned(), active);
        assert_invariants(&p);
    }

    #[test]
    fn random_operation_sequences_keep_invariants() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..500 {
            let ids = tab_ids(&p);
            let pick = |n: u64| ids[(n as usize) % ids.len()].clone();
            match next() % 4 {
                0 => {
                    let _ = p.create_tab();
                }
                1 => {
                    let id = pick(next());
                    let _ = p.close_tab(&id, |_| true);
                }
                2 => {
                    let (a, b) = (pick(next()), pick(next()));
                    p.reorder_tabs(&a, &b).unwrap();
                }
                _ => {
                    let id = pick(next());
                    p.activate_tab(&id).unwrap();
                }
            }
            assert_invariants(&p);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Form Sync & Debounce
// ═══════════════════════════════════════════════════════════════════

mod form_sync {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_is_written_once_after_quiet_period() {
        let market = MockMarket::default();
        let mut p = planner(&market);

        p.edit_field(FormField::Quantity, "1");
        tokio::time::advance(Duration::from_millis(100)).await;
        p.edit_field(FormField::Quantity, "12");
        tokio::time::advance(Duration::from_millis(100)).await;
        p.edit_field(FormField::Quantity, "120");
        assert_eq!(p.sync_state(), SyncState::Editing);

        // 299ms after the last keystroke: nothing written yet.
        tokio::time::advance(Duration::from_millis(299)).await;
        p.tick().await.unwrap();
        assert_eq!(p.active_tab().unwrap().quantity, "");

        tokio::time::advance(Duration::from_millis(1)).await;
        p.tick().await.unwrap();
        assert_eq!(p.active_tab().unwrap().quantity, "120");
        assert_eq!(p.sync_state(), SyncState::Idle);
        assert!(p.storage().get("stockTabs").unwrap().contains("\"quantity\":\"120\""));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_and_tick_runs_the_debounce() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "amd ");
        assert!(p.wait_and_tick().await.unwrap());
        assert_eq!(p.active_tab().unwrap().symbol, "amd");
        assert!(!p.wait_and_tick().await.unwrap());
    }

    #[test]
    fn results_follow_edits_immediately() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.edit_field(FormField::CurrentPrice, "100");
        assert!(p.form().results.is_none());
        p.edit_field(FormField::Quantity, "10");
        p.edit_field(FormField::TakeProfitPercent, "10");
        p.edit_field(FormField::StopLossPercent, "5");

        let r = p.form().results.as_ref().unwrap();
        assert_eq!(format!("{:.2}", r.tp_price), "110.00");
        assert_eq!(format!("{:.2}", r.sl_price), "95.00");
        assert_eq!(r.ratio.to_string(), "1:2.0");
    }

    #[test]
    fn invalid_input_surfaces_field_issues() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.edit_field(FormField::CurrentPrice, "-3");
        p.edit_field(FormField::Quantity, "2");
        assert!(p.form().results.is_none());
        assert_eq!(p.form().issues.len(), 1);
        assert_eq!(p.form().issues[0].field, FormField::CurrentPrice);
    }

    #[test]
    fn label_follows_live_symbol_before_flush() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "goog");
        assert_eq!(p.tab_summaries()[0].label, "GOOG");
        assert_eq!(p.active_tab().unwrap().symbol, "");
    }

    #[test]
    fn mode_switch_persists_immediately() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.set_calculation_mode(CalculationMode::Target).unwrap();
        assert_eq!(p.active_tab().unwrap().calculation_mode, CalculationMode::Target);
        assert!(p.storage().get("stockTabs").unwrap().contains("\"calculationMode\":\"target\""));
    }

    #[test]
    fn export_requires_results() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        assert!(matches!(p.export_summary(), Err(CoreError::ValidationError(_))));

        fill(&mut p, "aapl", "100", "10", "10", "5");
        let text = p.export_summary().unwrap();
        assert!(text.contains("Trade plan: AAPL"));
        assert!(text.contains("Risk/reward: 1:2.0"));
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_flushes_pending_edit_and_reload_resumes() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.create_tab().unwrap();
        p.edit_field(FormField::Symbol, "META");
        let active = p.active_tab_id().unwrap().clone();

        let storage = p.dispose().unwrap();
        let p = planner_on(storage, &market);
        assert_eq!(p.tabs().len(), 2);
        assert_eq!(p.active_tab_id(), Some(&active));
        assert_eq!(p.form().symbol, "META");
    }
}

// ═══════════════════════════════════════════════════════════════════
// Quote Cache Eviction
// ═══════════════════════════════════════════════════════════════════

mod cache_eviction {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn closing_sole_holder_evicts_shared_holder_keeps() {
        let market = MockMarket::with(&[("AAPL", 190.0), ("MSFT", 410.0)]);
        let mut p = planner(&market);

        fill(&mut p, "AAPL", "", "1", "", "");
        p.refresh_quote().await.unwrap();
        let aapl_1 = p.active_tab_id().unwrap().clone();

        let aapl_2 = p.create_tab().unwrap();
        fill(&mut p, "aapl", "", "1", "", "");

        let msft = p.create_tab().unwrap();
        fill(&mut p, "MSFT", "", "1", "", "");
        p.refresh_quote().await.unwrap();

        assert!(p.storage().get("stockPrice_AAPL").is_some());
        assert!(p.storage().get("stockPrice_MSFT").is_some());

        p.close_tab(&msft, |_| true).unwrap();
        assert!(p.storage().get("stockPrice_MSFT").is_none());

        p.close_tab(&aapl_1, |_| true).unwrap();
        assert!(p.storage().get("stockPrice_AAPL").is_some(), "still used by another tab");
        assert_eq!(p.active_tab_id(), Some(&aapl_2));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_tab_keeps_quote_still_typed_in_active_tab() {
        let market = MockMarket::with(&[("AAPL", 190.0)]);
        let mut p = planner(&market);
        fill(&mut p, "AAPL", "", "1", "", "");
        p.refresh_quote().await.unwrap();
        let first = p.active_tab_id().unwrap().clone();

        p.create_tab().unwrap();
        p.edit_field(FormField::Symbol, "aapl");
        assert_eq!(p.active_tab().unwrap().symbol, "", "not flushed yet");

        p.close_tab(&first, |_| true).unwrap();
        assert!(p.storage().get("stockPrice_AAPL").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_is_reused_without_calling_provider() {
        let market = MockMarket::with(&[("AAPL", 190.0)]);
        let mut p = planner_with(&market, PlannerSettings::default());
        fill(&mut p, "AAPL", "", "1", "", "");
        p.refresh_quote().await.unwrap();
        p.refresh_quote().await.unwrap();
        assert_eq!(market.calls(), vec!["AAPL"]);
        assert_eq!(p.cached_quote("aapl").unwrap().quote.price, 190.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Active-Tab Poller
// ═══════════════════════════════════════════════════════════════════

mod poller {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn toggle_on_fetches_immediately_then_every_interval() {
        let market = MockMarket::with(&[("X", 10.0)]);
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "X");
        assert!(market.calls().is_empty());

        p.set_auto_price(true).unwrap();
        p.tick().await.unwrap();
        assert_eq!(market.calls(), vec!["X"]);
        assert_eq!(p.form().current_price, "10.00");
        assert_eq!(p.active_tab().unwrap().current_price, "10.00");
        assert!(matches!(p.form().quote_status, QuoteStatus::Live { .. }));

        tokio::time::advance(Duration::from_secs(59)).await;
        p.tick().await.unwrap();
        assert_eq!(market.calls().len(), 1);

        market.set_price("X", 11.0);
        tokio::time::advance(Duration::from_secs(1)).await;
        p.tick().await.unwrap();
        assert_eq!(market.calls(), vec!["X", "X"]);
        assert_eq!(p.form().current_price, "11.00");
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_off_stops_fetching() {
        let market = MockMarket::with(&[("X", 10.0)]);
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "X");
        p.set_auto_price(true).unwrap();
        p.tick().await.unwrap();
        assert_eq!(market.calls().len(), 1);

        p.set_auto_price(false).unwrap();
        assert_eq!(p.poller_state(), PollerState::Idle);
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(60)).await;
            p.tick().await.unwrap();
        }
        assert_eq!(market.calls().len(), 1);
        assert!(!p.active_tab().unwrap().auto_price_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_price_without_symbol_stays_idle() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.set_auto_price(true).unwrap();
        assert_eq!(p.poller_state(), PollerState::Idle);

        p.edit_field(FormField::Symbol, "Y");
        assert!(matches!(p.poller_state(), PollerState::Polling { .. }));
        p.edit_field(FormField::Symbol, "   ");
        assert_eq!(p.poller_state(), PollerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_auto_tabs_fetches_new_symbol_only() {
        let market = MockMarket::with(&[("X", 10.0), ("Y", 20.0)]);
        let mut p = planner(&market);
        let a = p.active_tab_id().unwrap().clone();
        p.edit_field(FormField::Symbol, "X");
        p.set_auto_price(true).unwrap();
        p.tick().await.unwrap();

        let b = p.create_tab().unwrap();
        p.edit_field(FormField::Symbol, "Y");
        p.set_auto_price(true).unwrap();
        p.tick().await.unwrap();

        p.activate_tab(&a).unwrap();
        p.tick().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        p.activate_tab(&b).unwrap();
        p.tick().await.unwrap();
        let calls_at_switch = market.calls();
        assert_eq!(calls_at_switch.last().map(String::as_str), Some("Y"));

        // The old tab's leftover interval (due at +60s) never fires for X.
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(30)).await;
            p.tick().await.unwrap();
        }
        let after: Vec<String> = market.calls()[calls_at_switch.len()..].to_vec();
        assert_eq!(after, vec!["Y", "Y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_to_manual_tab_stops_polling() {
        let market = MockMarket::with(&[("X", 10.0)]);
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "X");
        p.set_auto_price(true).unwrap();
        p.tick().await.unwrap();

        p.create_tab().unwrap();
        assert_eq!(p.poller_state(), PollerState::Idle);
        tokio::time::advance(Duration::from_secs(120)).await;
        p.tick().await.unwrap();
        assert_eq!(market.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_polled_tab_stops_polling() {
        let market = MockMarket::with(&[("X", 10.0)]);
        let mut p = planner(&market);
        p.create_tab().unwrap();
        p.edit_field(FormField::Symbol, "X");
        p.set_auto_price(true).unwrap();
        let polled = p.active_tab_id().unwrap().clone();
        p.tick().await.unwrap();

        p.close_tab(&polled, |_| true).unwrap();
        assert_eq!(p.poller_state(), PollerState::Idle);
        tokio::time::advance(Duration::from_secs(120)).await;
        p.tick().await.unwrap();
        assert_eq!(market.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_failure_is_shown_then_reverts() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "NOPE");
        p.set_auto_price(true).unwrap();
        p.tick().await.unwrap();
        assert!(matches!(p.form().quote_status, QuoteStatus::Failed { .. }));

        tokio::time::advance(Duration::from_secs(3)).await;
        p.tick().await.unwrap();
        assert_eq!(p.form().quote_status, QuoteStatus::Manual);
    }

    #[tokio::test(start_paused = true)]
    async fn background_failure_keeps_last_price_silently() {
        let market = MockMarket::with(&[("X", 10.0)]);
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "X");
        p.set_auto_price(true).unwrap();
        p.tick().await.unwrap();
        let status = p.form().quote_status.clone();

        market.remove_price("X");
        tokio::time::advance(Duration::from_secs(60)).await;
        p.tick().await.unwrap();
        assert_eq!(market.calls().len(), 2);
        assert_eq!(p.form().current_price, "10.00");
        assert_eq!(p.form().quote_status, status);

        // Still polling after a failure.
        market.set_price("X", 12.0);
        tokio::time::advance(Duration::from_secs(60)).await;
        p.tick().await.unwrap();
        assert_eq!(p.form().current_price, "12.00");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_without_symbol_is_a_validation_error() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        let err = p.refresh_quote().await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert!(market.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_is_returned_and_shown() {
        let market = MockMarket::default();
        let mut p = planner(&market);
        p.edit_field(FormField::Symbol, "ZZZ");
        let err = p.refresh_quote().await.unwrap_err();
        assert!(matches!(err, CoreError::Api { .. }));
        match &p.form().quote_status {
            QuoteStatus::Failed { message } => assert!(message.contains("ZZZ")),
            other => panic!("expected failure status, got {other:?}"),
        }
    }
}
