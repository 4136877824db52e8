pub mod form_sync;
pub mod poller;
pub mod quote_service;
pub mod tab_store;
pub mod trade_math;
