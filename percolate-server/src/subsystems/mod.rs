pub mod export;
pub mod hub;
pub mod ledger;
pub mod lifecycle;
pub mod presence;
pub mod store;
