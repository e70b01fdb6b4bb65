pub mod hit;
pub mod invoice;
pub mod payment;
pub mod result;

pub use hit::{Hit, Hits};
pub use invoice::{Invoice, Invoices, TotalCaching};
pub use payment::Payment;
pub use result::{LedgerStats, MatchOutcome, MatchResultRow, PaymentOutcome, ReconciliationReport};
