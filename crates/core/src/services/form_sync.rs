use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::errors::CoreError;
use crate::models::form::{FormFields, QuoteStatus};
use crate::models::tab::{CalculationMode, TabId};
use crate::models::trade::FormField;
use crate::services::tab_store::TabStore;
use crate::services::trade_math::{self, Evaluation};
use crate::storage::traits::KeyValueStore;

/// Who is writing to the form right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Form and active record agree
    Idle,
    /// A record is being painted onto the form; writes are not user edits
    Loading,
    /// The user changed the form and a write-back is scheduled
    Editing,
}

/// The single debounce slot: one deferred write-back for one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlush {
    pub tab_id: TabId,
    pub due: Instant,
}

/// Live binding between the active [`TabRecord`](crate::models::tab::TabRecord)
/// and the on-screen form.
#[derive(Debug)]
pub struct FormSync {
    fields: FormFields,
    state: SyncState,
    pending: Option<PendingFlush>,
    debounce: Duration,
}

impl FormSync {
    pub fn new(debounce: Duration) -> Self {
        Self {
            fields: FormFields::default(),
            state: SyncState::Idle,
            pending: None,
            debounce,
        }
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn pending_flush(&self) -> Option<&PendingFlush> {
        self.pending.as_ref()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// A user keystroke. Writes the live field, recomputes the results and
    /// (re)schedules the write-back; any earlier pending write is replaced.
    ///
    /// Returns `false` and changes nothing while a load is painting the form.
    pub fn edit(&mut self, field: FormField, value: String, active: &TabId, now: Instant) -> bool {
        if self.state == SyncState::Loading {
            trace!(?field, "ignoring form write during load");
            return false;
        }
        self.fields.set(field, value);
        self.recompute();
        self.schedule_flush(active, now);
        true
    }

    /// Flip the live auto-price flag. The caller flushes right after.
    pub fn set_auto_price(&mut self, enabled: bool) {
        self.fields.auto_price_enabled = enabled;
        if !enabled {
            self.fields.quote_status = QuoteStatus::Manual;
        }
    }

    /// Switch the live calculation mode and recompute. The caller flushes right after.
    pub fn set_calculation_mode(&mut self, mode: CalculationMode) {
        self.fields.calculation_mode = mode;
        self.recompute();
    }

    /// Copy the live form into the active record and persist.
    ///
    /// Values are taken verbatim; only the symbol is trimmed. A no-op while
    /// loading, so a load's own writes are never echoed back into the record.
    /// Returns whether a write happened.
    pub fn flush_active_record(
        &mut self,
        store: &mut TabStore,
        storage: &mut dyn KeyValueStore,
    ) -> Result<bool, CoreError> {
        if self.state == SyncState::Loading {
            trace!("flush suppressed during load");
            return Ok(false);
        }
        self.pending = None;
        self.state = SyncState::Idle;

        let Some(record) = store.active_mut() else {
            return Ok(false);
        };
        self.fields.write_into(record);
        let id = record.id.clone();
        store.persist(storage)?;
        debug!(tab = %id, "flushed form into tab");
        Ok(true)
    }

    /// Paint the active record onto the form.
    ///
    /// Cancels any pending write-back first: it belongs to whatever was on
    /// the form before. Blank stored fields stay blank. Results are shown
    /// only when price and quantity are both present.
    pub fn load_active_record(&mut self, store: &TabStore) {
        self.state = SyncState::Loading;
        self.pending = None;

        match store.active() {
            Some(record) => self.fields.fill_from(record),
            None => self.fields = FormFields::default(),
        }
        self.fields.quote_status = QuoteStatus::Manual;
        self.recompute();

        // Field writes above are plain assignments with no listeners, so
        // the load is complete here.
        self.state = SyncState::Idle;
        if let Some(id) = store.active_id() {
            debug!(tab = %id, "loaded tab into form");
        }
    }

    /// Take the pending write-back if it is due at `now`.
    ///
    /// Returns `true` when the caller should flush. A due write-back bound
    /// to a tab that is no longer active is discarded.
    pub fn take_due_flush(&mut self, now: Instant, active: Option<&TabId>) -> bool {
        match &self.pending {
            Some(p) if p.due <= now => {}
            _ => return false,
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };
        if active == Some(&pending.tab_id) {
            true
        } else {
            debug!(tab = %pending.tab_id, "discarding write-back for inactive tab");
            self.state = SyncState::Idle;
            false
        }
    }

    /// A fetched price lands in the live form.
    pub fn apply_quote(&mut self, price: f64, fetched_at: DateTime<Utc>) {
        self.fields.current_price = trade_math::format_amount(price);
        self.fields.quote_status = QuoteStatus::Live { fetched_at };
        self.recompute();
    }

    pub fn set_quote_status(&mut self, status: QuoteStatus) {
        self.fields.quote_status = status;
    }

    /// Drop the pending write-back without running it.
    pub fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            trace!("pending write-back cancelled");
        }
        if self.state == SyncState::Editing {
            self.state = SyncState::Idle;
        }
    }

    fn schedule_flush(&mut self, active: &TabId, now: Instant) {
        self.pending = Some(PendingFlush {
            tab_id: active.clone(),
            due: now + self.debounce,
        });
        self.state = SyncState::Editing;
    }

    fn recompute(&mut self) {
        match trade_math::evaluate(&self.fields) {
            Evaluation::Hidden => {
                self.fields.results = None;
                self.fields.issues.clear();
            }
            Evaluation::Invalid(issues) => {
                self.fields.results = None;
                self.fields.issues = issues;
            }
            Evaluation::Ready(levels) => {
                self.fields.results = Some(levels);
                self.fields.issues.clear();
            }
        }
    }
}
