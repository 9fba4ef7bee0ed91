#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Plan phase: turn a detection snapshot and a requested action into an
//! ordered plan
//!
//! Planning is pure computation. Given the same snapshot, action and
//! extension responses it produces an identical plan, down to the
//! content digest; only the plan id differs between runs. Nothing here
//! touches the machine.

mod plan;
mod planner;

pub use plan::{CacheEntry, ExecuteEntry, Plan, RollbackEntry, TransactionGroup};
pub use planner::Planner;
