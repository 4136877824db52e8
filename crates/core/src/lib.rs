pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use models::{
    form::{FormFields, QuoteStatus},
    quote::QuoteCacheEntry,
    settings::PlannerSettings,
    tab::{normalize_symbol, CalculationMode, TabId, TabRecord, TabSummary},
    trade::FormField,
};
use providers::registry::QuoteProviderRegistry;
use services::{
    form_sync::{FormSync, SyncState},
    poller::{ActiveTabPoller, DueCycle, PollerState},
    quote_service::QuoteService,
    tab_store::TabStore,
    trade_math,
};
use storage::{quote_cache::QuoteCache, traits::KeyValueStore};
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use errors::CoreError;

/// Result of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// The user declined the confirmation; nothing changed
    Cancelled,
}

/// Main entry point for the trade planner core library.
///
/// Owns the durable storage, the tab collection, the live form, the quote
/// poller and the quote service. A host UI translates gestures into method
/// calls, paints [`form`](Self::form) and [`tab_summaries`](Self::tab_summaries),
/// and drives timers by sleeping until [`next_deadline`](Self::next_deadline)
/// and calling [`tick`](Self::tick).
///
/// All mutations run to completion synchronously. Only `tick` and
/// `refresh_quote` suspend, and only while a provider is being awaited.
#[must_use]
pub struct TradePlanner {
    storage: Box<dyn KeyValueStore>,
    settings: PlannerSettings,
    tabs: TabStore,
    form: FormSync,
    poller: ActiveTabPoller,
    quotes: QuoteService,
    /// When a failed foreground fetch falls back to manual entry.
    revert_at: Option<Instant>,
}

impl std::fmt::Debug for TradePlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradePlanner")
            .field("tabs", &self.tabs.len())
            .field("active", &self.tabs.active_id())
            .field("sync", &self.form.state())
            .field("poller", &self.poller.state())
            .finish()
    }
}

impl TradePlanner {
    /// Restore the planner from `storage` with the default quote providers.
    pub fn initialize(
        storage: Box<dyn KeyValueStore>,
        settings: PlannerSettings,
    ) -> Result<Self, CoreError> {
        let registry = QuoteProviderRegistry::new_with_defaults(&settings.api_keys);
        Self::with_registry(storage, settings, registry)
    }

    /// Restore the planner from `storage` using a caller-supplied provider registry.
    ///
    /// Repairs the tab collection if needed, drops cached quotes no tab
    /// refers to, loads the active tab into the form and starts polling if
    /// that tab wants it.
    pub fn with_registry(
        mut storage: Box<dyn KeyValueStore>,
        settings: PlannerSettings,
        registry: QuoteProviderRegistry,
    ) -> Result<Self, CoreError> {
        settings.validate()?;

        let tabs = TabStore::initialize(storage.as_mut(), settings.max_tabs)?;
        let cache = QuoteCache::new(settings.quote_cache_ttl());
        let swept = cache.sweep_orphans(storage.as_mut(), &tabs.referenced_symbols())?;
        if swept > 0 {
            info!(removed = swept, "removed cached quotes no tab refers to");
        }

        let mut planner = Self {
            form: FormSync::new(settings.debounce()),
            poller: ActiveTabPoller::new(settings.poll_interval()),
            quotes: QuoteService::new(registry, cache),
            storage,
            settings,
            tabs,
            revert_at: None,
        };
        planner.form.load_active_record(&planner.tabs);
        planner.reevaluate_poller();
        Ok(planner)
    }

    /// Write back pending edits, cancel every timer and hand the storage back.
    pub fn dispose(mut self) -> Result<Box<dyn KeyValueStore>, CoreError> {
        if self.form.pending_flush().is_some() {
            self.form
                .flush_active_record(&mut self.tabs, self.storage.as_mut())?;
        }
        self.form.cancel_pending();
        self.poller.stop();
        self.revert_at = None;
        info!("planner disposed");
        Ok(self.storage)
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[must_use]
    pub fn tabs(&self) -> &[TabRecord] {
        self.tabs.tabs()
    }

    /// Tab strip entries. The active label follows the live symbol.
    #[must_use]
    pub fn tab_summaries(&self) -> Vec<TabSummary> {
        self.tabs.summaries(Some(self.form.fields().symbol.as_str()))
    }

    #[must_use]
    pub fn active_tab_id(&self) -> Option<&TabId> {
        self.tabs.active_id()
    }

    #[must_use]
    pub fn active_tab(&self) -> Option<&TabRecord> {
        self.tabs.active()
    }

    /// The live form bound to the active tab.
    #[must_use]
    pub fn form(&self) -> &FormFields {
        self.form.fields()
    }

    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.form.state()
    }

    #[must_use]
    pub fn poller_state(&self) -> PollerState {
        self.poller.state()
    }

    #[must_use]
    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    #[must_use]
    pub fn storage(&self) -> &dyn KeyValueStore {
        self.storage.as_ref()
    }

    /// Last cached quote for `symbol`, fresh or not (for the details panel).
    #[must_use]
    pub fn cached_quote(&self, symbol: &str) -> Option<QuoteCacheEntry> {
        self.quotes.cache().get(self.storage.as_ref(), symbol)
    }

    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.quotes.provider_names()
    }

    // ── Tab Management ──────────────────────────────────────────────

    /// Open a blank tab and make it active.
    ///
    /// The current tab's edits are written back first. At the tab limit
    /// this fails with [`CoreError::TabLimitReached`] and nothing changes.
    pub fn create_tab(&mut self) -> Result<TabId, CoreError> {
        if self.tabs.is_full() {
            warn!(max = self.tabs.max_tabs(), "tab limit reached");
            return Err(CoreError::TabLimitReached(self.tabs.max_tabs()));
        }
        self.form
            .flush_active_record(&mut self.tabs, self.storage.as_mut())?;
        let id = self.tabs.push_new(self.storage.as_mut())?;
        self.form.load_active_record(&self.tabs);
        self.revert_at = None;
        self.reevaluate_poller();
        Ok(id)
    }

    /// Switch the form to tab `id`.
    ///
    /// Returns `Ok(false)` if `id` is already active or unknown (the latter
    /// is logged). The outgoing tab is flushed before the pointer moves.
    pub fn activate_tab(&mut self, id: &TabId) -> Result<bool, CoreError> {
        if self.tabs.active_id() == Some(id) {
            return Ok(false);
        }
        if !self.tabs.contains(id) {
            warn!(tab = %id, "cannot activate unknown tab");
            return Ok(false);
        }

        self.form
            .flush_active_record(&mut self.tabs, self.storage.as_mut())?;
        self.tabs.set_active(id, self.storage.as_mut())?;
        self.form.load_active_record(&self.tabs);
        self.revert_at = None;
        self.reevaluate_poller();
        Ok(true)
    }

    /// Close tab `id`.
    ///
    /// The last tab is never closed ([`CoreError::LastTab`]). A tab holding a
    /// symbol asks `confirm` first; declining returns
    /// [`CloseOutcome::Cancelled`]. The symbol's cached quote is dropped once
    /// no other tab uses it. Closing the active tab activates its left
    /// neighbour, or the first tab.
    pub fn close_tab<F>(&mut self, id: &TabId, confirm: F) -> Result<CloseOutcome, CoreError>
    where
        F: FnOnce(&str) -> bool,
    {
        let position = self
            .tabs
            .position(id)
            .ok_or_else(|| CoreError::TabNotFound(id.to_string()))?;
        if self.tabs.len() <= 1 {
            return Err(CoreError::LastTab);
        }

        if self.tabs.active_id() == Some(id) {
            self.form
                .flush_active_record(&mut self.tabs, self.storage.as_mut())?;
        }
        if let Some(record) = self.tabs.get(id) {
            if record.normalized_symbol().is_some() {
                let message = format!(
                    "Close tab \"{}\"? Its saved values will be lost.",
                    record.display_label(position)
                );
                if !confirm(&message) {
                    debug!(tab = %id, "close cancelled");
                    return Ok(CloseOutcome::Cancelled);
                }
            }
        }

        let removed = self.tabs.remove(id, self.storage.as_mut())?;
        if let Some(symbol) = removed.record.normalized_symbol() {
            // The active tab's live symbol may not have been flushed yet.
            let live = !removed.was_active
                && normalize_symbol(&self.form.fields().symbol).as_deref() == Some(symbol.as_str());
            if !live && !self.tabs.is_symbol_referenced(&symbol) {
                self.quotes.cache().evict(self.storage.as_mut(), &symbol)?;
            }
        }

        if removed.was_active {
            self.form.load_active_record(&self.tabs);
            self.revert_at = None;
            self.reevaluate_poller();
        }
        Ok(CloseOutcome::Closed)
    }

    /// Move tab `moved` immediately before tab `before`. The active tab does not change.
    pub fn reorder_tabs(&mut self, moved: &TabId, before: &TabId) -> Result<bool, CoreError> {
        self.tabs.reorder(moved, before, self.storage.as_mut())
    }

    /// Remove every tab and start over with one blank tab.
    ///
    /// `confirm` receives a stronger warning when any tab holds data.
    /// Returns `Ok(false)` if declined.
    pub fn clear_all<F>(&mut self, confirm: F) -> Result<bool, CoreError>
    where
        F: FnOnce(&str) -> bool,
    {
        self.form
            .flush_active_record(&mut self.tabs, self.storage.as_mut())?;

        let count = self.tabs.len();
        let message = if self.tabs.tabs().iter().any(TabRecord::has_data) {
            format!("Delete all {count} tabs and every value entered in them? This cannot be undone.")
        } else {
            "Reset all tabs?".to_string()
        };
        if !confirm(&message) {
            debug!("clear all cancelled");
            return Ok(false);
        }

        let removed = self.tabs.reset(self.storage.as_mut())?;
        self.form.load_active_record(&self.tabs);
        self.revert_at = None;
        self.reevaluate_poller();

        let symbols: HashSet<String> = removed.iter().filter_map(TabRecord::normalized_symbol).collect();
        for symbol in symbols {
            self.quotes.cache().evict(self.storage.as_mut(), &symbol)?;
        }
        info!(removed = removed.len(), "all tabs reset");
        Ok(true)
    }

    // ── Form ────────────────────────────────────────────────────────

    /// A keystroke in one of the form's inputs.
    ///
    /// The results update at once; the tab itself is written after the
    /// debounce quiet period. A symbol change also re-evaluates polling.
    pub fn edit_field(&mut self, field: FormField, value: impl Into<String>) -> bool {
        let Some(active) = self.tabs.active_id().cloned() else {
            return false;
        };
        let accepted = self.form.edit(field, value.into(), &active, Instant::now());
        if accepted && field == FormField::Symbol {
            self.reevaluate_poller();
        }
        accepted
    }

    /// Write the form into the active tab now instead of waiting for the debounce.
    pub fn flush(&mut self) -> Result<bool, CoreError> {
        self.form
            .flush_active_record(&mut self.tabs, self.storage.as_mut())
    }

    /// Toggle auto-pricing for the active tab. Persists immediately.
    pub fn set_auto_price(&mut self, enabled: bool) -> Result<(), CoreError> {
        self.form.set_auto_price(enabled);
        if !enabled {
            self.revert_at = None;
        }
        self.flush()?;
        self.reevaluate_poller();
        Ok(())
    }

    /// Switch the active tab between current-price and target-price mode. Persists immediately.
    pub fn set_calculation_mode(&mut self, mode: CalculationMode) -> Result<(), CoreError> {
        self.form.set_calculation_mode(mode);
        self.flush()?;
        Ok(())
    }

    /// Plain-text summary of the current results for the clipboard.
    pub fn export_summary(&self) -> Result<String, CoreError> {
        let fields = self.form.fields();
        let levels = fields.results.as_ref().ok_or_else(|| {
            CoreError::ValidationError("Nothing to export: enter a price and a quantity".into())
        })?;
        Ok(trade_math::export_summary(
            &fields.symbol,
            fields.calculation_mode,
            levels,
        ))
    }

    // ── Timers & Quotes ─────────────────────────────────────────────

    /// Earliest pending timer: debounce write-back, error revert or poll.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.form.next_deadline(),
            self.revert_at,
            self.poller.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run every timer that is due now.
    ///
    /// Provider failures are handled here (shown or logged) and never
    /// returned; only storage failures are.
    pub async fn tick(&mut self) -> Result<(), CoreError> {
        let now = Instant::now();

        if self.form.take_due_flush(now, self.tabs.active_id()) {
            self.flush()?;
        }

        if self.revert_at.is_some_and(|at| at <= now) {
            self.revert_at = None;
            if matches!(self.form.fields().quote_status, QuoteStatus::Failed { .. }) {
                self.form.set_quote_status(QuoteStatus::Manual);
            }
        }

        if let Some(cycle) = self.poller.due(now) {
            self.poll_cycle(cycle, now).await?;
        }
        Ok(())
    }

    /// Sleep until the next deadline and run it. Returns `false` at once if
    /// no timer is pending.
    pub async fn wait_and_tick(&mut self) -> Result<bool, CoreError> {
        let Some(deadline) = self.next_deadline() else {
            return Ok(false);
        };
        tokio::time::sleep_until(deadline).await;
        self.tick().await?;
        Ok(true)
    }

    /// Fetch a quote for the active tab's symbol now, whatever its
    /// auto-price setting. Failures are shown on the form and returned.
    pub async fn refresh_quote(&mut self) -> Result<QuoteCacheEntry, CoreError> {
        let symbol = normalize_symbol(&self.form.fields().symbol)
            .ok_or_else(|| CoreError::ValidationError("Enter a symbol first".into()))?;

        match self.quotes.get_quote(self.storage.as_mut(), &symbol).await {
            Ok(entry) => {
                self.apply_quote(&entry)?;
                Ok(entry)
            }
            Err(e) => {
                self.show_fetch_failure(&e);
                Err(e)
            }
        }
    }

    // ── Internal ────────────────────────────────────────────────────

    fn reevaluate_poller(&mut self) {
        let wants = self.tabs.active().is_some() && self.form.fields().wants_auto_price();
        self.poller.reevaluate(wants, Instant::now());
    }

    async fn poll_cycle(&mut self, cycle: DueCycle, now: Instant) -> Result<(), CoreError> {
        // The active tab may have been closed or changed its mind since scheduling.
        if self.tabs.active().is_none() || !self.form.fields().wants_auto_price() {
            self.poller.stop();
            return Ok(());
        }
        let Some(symbol) = normalize_symbol(&self.form.fields().symbol) else {
            self.poller.stop();
            return Ok(());
        };
        self.poller.complete_cycle(now);

        match self.quotes.get_quote(self.storage.as_mut(), &symbol).await {
            Ok(entry) => self.apply_quote(&entry),
            Err(e) if cycle.foreground => {
                self.show_fetch_failure(&e);
                Ok(())
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "background quote refresh failed");
                Ok(())
            }
        }
    }

    fn apply_quote(&mut self, entry: &QuoteCacheEntry) -> Result<(), CoreError> {
        self.form.apply_quote(entry.quote.price, entry.fetched_at);
        if let Some(record) = self.tabs.active_mut() {
            record.current_price = self.form.fields().current_price.clone();
            self.tabs.persist(self.storage.as_mut())?;
        }
        self.revert_at = None;
        Ok(())
    }

    fn show_fetch_failure(&mut self, error: &CoreError) {
        warn!(error = %error, "quote fetch failed");
        self.form.set_quote_status(QuoteStatus::Failed {
            message: format!("Could not fetch price: {error}"),
        });
        self.revert_at = Some(Instant::now() + self.settings.error_revert_delay());
    }
}
