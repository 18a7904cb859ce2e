#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Per-node idle/sleep lifecycle and cost-savings accounting (spec §4.5).
//!
//! Savings are integer cents throughout; the only floating-point step is
//! the single `round()` in the savings formula, matching spec §9's "avoid
//! floating-point accumulation except within a single rounding step."

mod event;
mod manager;
mod node;

pub use event::{IdleEvent, IdleEventKind};
pub use manager::{IdleManager, IdleManagerConfig};
pub use node::{IdleNodeEntry, NodeState};
