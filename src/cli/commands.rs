use crate::cli::Commands;
use crate::config::Config;
use crate::k8s::{EventHandlers, K8sClient, PodInfo, WatchSession};
use crate::metrics::MetricsCollector;
use crate::node::local::LocalAddressResolver;
use crate::node::{pack_ipv4, CachedResolver};
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use std::path::PathBuf;
use tracing::info;

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Watch {
            node_name,
            sandbox,
            ip_list_file,
            resync_secs,
        } => {
            let config = Config::new(node_name, sandbox, ip_list_file, resync_secs)
                .context("Invalid configuration")?;
            handle_watch(config).await
        }
        Commands::Local {
            address,
            ip_list_file,
        } => handle_local(address, ip_list_file),
        Commands::Pack { address } => handle_pack(address),
    }
}

async fn handle_watch(config: Config) -> Result<()> {
    info!(
        "Watching pods for node {} (sandbox={})",
        config.node_name, config.sandbox
    );

    let metrics = MetricsCollector::new()?;
    let resolver = CachedResolver::new(LocalAddressResolver::new(config.ip_list_file.clone()))
        .with_metrics(metrics.clone());

    let client = K8sClient::try_default().await?;
    let handlers = pod_handlers(resolver);

    let mut session = WatchSession::new(client.pod_feed(), config.session_config(), handlers)
        .with_metrics(metrics.clone());

    session
        .start()
        .await
        .context("Failed to start pod watch session")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    session.shutdown().await;

    print!("{}", metrics.gather()?);
    Ok(())
}

fn pod_handlers(resolver: CachedResolver) -> EventHandlers<Pod> {
    let (on_add, on_update) = (resolver.clone(), resolver);

    EventHandlers::new()
        .on_add(move |pod| log_pod("added", &PodInfo::from_k8s_pod(pod), &on_add))
        .on_update(move |old, new| {
            let (old, new) = (PodInfo::from_k8s_pod(old), PodInfo::from_k8s_pod(new));
            if old != new {
                log_pod("updated", &new, &on_update);
            }
        })
        .on_delete(|pod| {
            let pod = PodInfo::from_k8s_pod(pod);
            info!("Pod deleted: {}/{}", pod.namespace, pod.name);
        })
}

fn log_pod(action: &str, pod: &PodInfo, resolver: &CachedResolver) {
    let ip = pod.pod_ip.as_deref().unwrap_or("");
    let local = !ip.is_empty() && resolver.is_local(ip);
    info!(
        "Pod {}: {}/{} ip={} phase={} sidecar={} node_ip={}",
        action, pod.namespace, pod.name, ip, pod.phase, pod.has_sidecar, local
    );
}

fn handle_local(address: String, ip_list_file: Option<PathBuf>) -> Result<()> {
    let resolver = LocalAddressResolver::new(ip_list_file);
    println!("{}", resolver.is_local(&address));
    Ok(())
}

fn handle_pack(address: String) -> Result<()> {
    let packed = pack_ipv4(&address)?;
    println!("{} 0x{:08x}", packed, packed);
    Ok(())
}
