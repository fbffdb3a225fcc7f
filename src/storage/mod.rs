pub mod db;
pub mod models;

pub use db::Database;
pub use models::{CandidateFilter, CollectionAction, Contract, NewContract, StatusOverride};
