pub mod connectivity;
pub mod engine;
pub mod lifecycle;
pub mod retry;
pub mod scheduler;
pub mod summary;

pub use connectivity::{ConnectivityProbe, TcpProbe};
pub use engine::Reconciler;
pub use lifecycle::{Heartbeat, ShutdownSignal, Watchdog};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{CandidateSet, CheckKind};
pub use summary::{ContractOutcome, CycleSummary};
