//! Engine crate: the append-only event ledger, its three independent
//! consumers (indexer, quest engine, news generator), the pure derived-view
//! functions, and the pay-per-call gate core.

pub mod indexer;
pub mod news;
pub mod payment;
pub mod quests;
pub mod settings;
pub mod store;
pub mod views;
