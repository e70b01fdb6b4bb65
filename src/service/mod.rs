pub mod ledger;
pub mod matcher;
pub mod reconciler;

pub use ledger::LedgerReconciler;
pub use matcher::{find_hits, find_hits_with, MatchOptions};
pub use reconciler::Reconciler;
