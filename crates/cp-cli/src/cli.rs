use clap::{Parser, Subcommand, ValueEnum};

/// Scenario names mirroring spec §8's literal walkthroughs (S1-S6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioName {
    /// Failover then failback.
    S1,
    /// Artifact eviction under a total-size cap.
    S2,
    /// Quota hard limit rejection.
    S3,
    /// Quota daily rollover.
    S4,
    /// Idle sleep/wake cycle with cost accounting.
    S5,
    /// End-to-end job lifecycle.
    S6,
    /// Run every scenario in order.
    All,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Narrate one (or all) of the scenarios from spec §8 against an
    /// in-memory control plane driven by a manual clock.
    Scenario {
        #[arg(value_enum, default_value = "all")]
        name: ScenarioName,
    },
    /// Run a live control plane against the wall clock, printing every
    /// published event until interrupted.
    Watch,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "clusterctl", version, about = "Cluster control-plane core demo/ops CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to an optional JSON config overriding component defaults.
    #[arg(long, env = "CLUSTERCTL_CONFIG")]
    pub config: Option<std::path::PathBuf>,
}
