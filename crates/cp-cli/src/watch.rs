//! Live demo mode: runs one control plane against the wall clock, seeds a
//! region and a node, starts the two background timers (spec §5's
//! suspension points), and prints every published event until interrupted.

use std::sync::Arc;

use cp_control_plane::{ControlPlane, ControlPlaneConfig, ControlPlaneEvent};
use cp_failover_manager::RegionFailoverConfig;
use cp_types::{NodeId, RandomIdGenerator, RegionId, SystemClock};
use futures::StreamExt;

use crate::config::ClusterctlConfig;
use crate::shutdown::{ShutdownController, ShutdownEvent, spawn_ctrl_c_handler};

pub async fn run(cfg: ClusterctlConfig) -> anyhow::Result<()> {
    let mut cp_config = ControlPlaneConfig::default();
    if let Some(idle_timeout_ms) = cfg.idle_timeout_ms {
        cp_config.idle.idle_timeout_ms = idle_timeout_ms;
    }
    if let Some(max_total_size_bytes) = cfg.artifact_max_total_size_bytes {
        cp_config.artifact_store.max_total_size_bytes = max_total_size_bytes;
    }
    let cp = ControlPlane::new(cp_config, Arc::new(SystemClock), Arc::new(RandomIdGenerator))?;

    let region = RegionId::from(cfg.default_region_id.unwrap_or_else(|| "demo-r1".to_string()));
    let node = NodeId::from(cfg.default_node_id.unwrap_or_else(|| "demo-n1".to_string()));
    cp.failover.register_region(RegionFailoverConfig {
        region_id: region.clone(),
        backup_region_id: RegionId::from("demo-r2"),
        failure_threshold: 3,
        check_interval_ms: 1000,
        failback_delay_ms: 60_000,
        recovery_threshold: 2,
    })?;
    cp.idle.register_node(node.clone(), Some(600), true);

    cp.artifact_store.start_cleanup(60_000);
    cp.idle.start_idle_check(30_000);

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    println!("clusterctl watch — region={region} node={node}. Press CTRL+C to stop.");
    let mut events = Box::pin(cp.subscribe_all());

    loop {
        tokio::select! {
            ev = shutdown_rx.recv() => {
                match ev {
                    Some(ShutdownEvent::Graceful) => {
                        println!("stopping background tasks...");
                        cp.artifact_store.stop_cleanup();
                        cp.idle.stop_idle_check();
                        break;
                    }
                    Some(ShutdownEvent::Immediate) | None => break,
                }
            }
            event = events.next() => {
                match event {
                    Some(ControlPlaneEvent::Job(n)) => println!("[job] {n:?}"),
                    Some(ControlPlaneEvent::Quota(e)) => println!("[quota] {e:?}"),
                    Some(ControlPlaneEvent::Failover(e)) => println!("[failover] {e:?}"),
                    Some(ControlPlaneEvent::Idle(e)) => println!("[idle] {e:?}"),
                    None => break,
                }
            }
        }
    }

    Ok(())
}
