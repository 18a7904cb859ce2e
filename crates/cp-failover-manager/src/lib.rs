#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Per-region health state machine with hysteresis (spec §4.4).
//!
//! Flapping is resisted two ways: a `Degraded` midpoint at
//! `ceil(failureThreshold / 2)` consecutive failures before a full
//! failover, and a failback floor requiring both a minimum elapsed time
//! (`failbackDelayMs`) and a minimum streak of successes
//! (`recoveryThreshold`) before returning to `Normal`.

mod event;
mod manager;
mod region;

pub use event::{FailoverEvent, HealthCheckResult};
pub use manager::{FailoverManager, FailoverManagerConfig};
pub use region::{FailoverState, RegionFailoverConfig, RegionFailoverState};
