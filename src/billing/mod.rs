pub mod classifier;
pub mod eligibility;
pub mod parse;
pub mod types;

pub use classifier::{classify, Classification, ClassificationContext, Rule, DEFAULT_CUTOFF_DAYS};
pub use eligibility::{contract_window, eligibility_window, EligibilityWindow};
pub use types::{ContractStatus, InvoiceFact};
