use devastator::admin;
use devastator::config::DevastatorConfig;
use devastator::engine::DistributedEngine;
use devastator::executor::{DistributedJobScheduler, Job, JobHandlerRegistry};
use devastator::membership::{
    Cluster, ClusterMetadata, ClusterNode, GroupTransport, LocalGroup, NodeAttributes,
};
use devastator::storage::PersistStorage;
use devastator::timer::HashedWheelTimer;
use serde::Deserialize;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Payload of the "delay" job handler.
#[derive(Debug, Deserialize)]
struct DelayedJob {
    after_ms: u64,
    job: Job,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<String> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(args[i + 1].clone());
                i += 2;
            }
            "--help" | "-h" => {
                eprintln!("Usage: {} [--config <path.toml>]", args[0]);
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    let config = match &config_path {
        Some(path) => DevastatorConfig::load(path)?,
        None => {
            tracing::info!("No --config given, using defaults");
            DevastatorConfig::default()
        }
    };

    // 1. Membership:
    let node = ClusterNode::new(
        config.cluster.instance_name.clone(),
        config.cluster.host_name.clone(),
        config.cluster.role,
    )
    .with_attributes(NodeAttributes::from_map(config.cluster.attributes.clone()));
    tracing::info!("Node ID: {}", node.id);

    let group = LocalGroup::new(config.cluster.cluster_name.clone());
    let transport: Arc<dyn GroupTransport> = group.join(node);

    let metadata = Arc::new(ClusterMetadata::new(
        config.cluster.partition_count,
        config.cluster.backup_nums,
        config.cluster.neighbor_policy.clone(),
    )?);
    let cluster = Cluster::new(
        config.cluster.cluster_name.clone(),
        &transport,
        metadata,
        config.cluster.view_changed_queue_size,
    )?;

    // 2. Storage and timer:
    let storage = Arc::new(PersistStorage::open_with(&config.storage)?);

    let timer = Arc::new(HashedWheelTimer::new(&config.timer));
    timer.start()?;

    // 3. Engine and jobs:
    let engine = DistributedEngine::new(cluster.clone(), transport, &config.engine);

    let registry = JobHandlerRegistry::new();
    registry.register("log", |job| async move {
        tracing::info!("Executing job {} with payload {}", job.id.0, job.payload);
        Ok(())
    });

    // "persist" writes the payload under the job key (or id) into the default family.
    let persist_target: Weak<PersistStorage> = Arc::downgrade(&storage);
    registry.register("persist", move |job| {
        let storage = persist_target.clone();
        async move {
            let storage = storage
                .upgrade()
                .ok_or_else(|| anyhow::anyhow!("storage is closed"))?;
            let key = job.key.clone().unwrap_or_else(|| job.id.0.clone());
            storage.put(key.as_bytes(), &serde_json::to_vec(&job.payload)?)?;
            Ok(())
        }
    });

    // "delay" resubmits `payload.job` after `payload.after_ms` through the timer.
    let delayed_scheduler: Arc<OnceLock<Weak<DistributedJobScheduler>>> = Arc::new(OnceLock::new());
    let delay_timer = timer.clone();
    let delay_target = delayed_scheduler.clone();
    registry.register("delay", move |job| {
        let timer = delay_timer.clone();
        let target = delay_target.clone();
        async move {
            let request: DelayedJob = serde_json::from_value(job.payload)?;
            timer.new_timeout(Duration::from_millis(request.after_ms), move || {
                let scheduler = target
                    .get()
                    .and_then(Weak::upgrade)
                    .ok_or_else(|| anyhow::anyhow!("scheduler is shut down"))?;
                scheduler.submit(request.job)?;
                Ok(())
            })?;
            Ok(())
        }
    });

    let scheduler = DistributedJobScheduler::new(engine.clone(), registry, &config.executor);
    let _ = delayed_scheduler.set(Arc::downgrade(&scheduler));

    // 4. Spawn ownership reporter:
    let stats_cluster = cluster.clone();
    let stats_scheduler = scheduler.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            let view = stats_cluster.view();
            tracing::info!(
                "Cluster stats: view {} with {} members, {} primary / {} backup partitions local",
                view.version(),
                view.len(),
                stats_cluster.local_primary_partitions().len(),
                stats_cluster.local_backup_partitions().len()
            );
            for stats in stats_scheduler.executor_stats() {
                tracing::info!(
                    "  - executor '{}' completed={} failed={}",
                    stats.name,
                    stats.completed,
                    stats.failed
                );
            }
        }
    });

    // 5. Admin HTTP server:
    if config.admin.enabled {
        let app = admin::router(cluster.clone(), engine.clone());
        let listener = tokio::net::TcpListener::bind(config.admin.bind).await?;
        tracing::info!("Admin server listening on {}", config.admin.bind);
        tracing::info!("Press Ctrl+C to shutdown");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
    } else {
        tracing::info!("Press Ctrl+C to shutdown");
        tokio::signal::ctrl_c().await?;
    }

    // 6. Shutdown:
    tracing::info!("Shutting down");
    scheduler.shutdown();
    timer.stop()?;
    match Arc::try_unwrap(storage) {
        Ok(storage) => storage.close()?,
        Err(_) => tracing::warn!("Storage still referenced at shutdown; flushing on drop"),
    }
    group.leave(&cluster.local_node().id);

    Ok(())
}
