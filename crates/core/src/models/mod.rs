pub mod form;
pub mod quote;
pub mod settings;
pub mod tab;
pub mod trade;
