//! Agent runtime: alternates between the pairing server and the controller
//! link until a shutdown signal arrives.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use screenlink_config::ClientConfig;
use screenlink_core::Observers;
use screenlink_gateway::run_pairing_server;
use screenlink_infra::{InterfaceSource, PairedSessionStore, PairingCodeStore, SysfsInterfaces};
use screenlink_link::{
    CommandDispatcher, LinkExit, LinkSettings, ScriptScreenControl, SessionManager, StatusReporter,
    SystemReboot,
};
use screenlink_logging::LifecycleLogger;
use screenlink_security::{IpReputationTracker, PairingCoordinator, PairingSettings};

pub async fn run(
    config: ClientConfig,
    code_store: PairingCodeStore,
    paired_store: PairedSessionStore,
) -> Result<()> {
    let observers = Observers::new();
    observers.register(Arc::new(LifecycleLogger));

    let interfaces: Arc<dyn InterfaceSource> = Arc::new(SysfsInterfaces::default());
    let tracker = Arc::new(IpReputationTracker::new(
        config.max_ip_violations,
        config.ip_blacklist_duration,
    ));
    let coordinator = Arc::new(PairingCoordinator::new(
        PairingSettings::from_config(&config),
        tracker,
        code_store,
        paired_store.clone(),
        interfaces.clone(),
        observers.clone(),
    ));

    let dispatcher = CommandDispatcher::new(
        StatusReporter::new(config.client_id.clone(), interfaces),
        Arc::new(ScriptScreenControl::new(&config.screen_switch_path)),
        Arc::new(SystemReboot::default()),
    )
    .with_commands_disabled(config.disable_commands);
    let manager = Arc::new(SessionManager::new(
        LinkSettings::from_config(&config),
        paired_store.clone(),
        Arc::new(dispatcher),
        observers,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let pairing_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));

    while !shutdown.is_cancelled() {
        let descriptor = match paired_store.load().await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable paired descriptor");
                paired_store
                    .delete()
                    .await
                    .context("Failed to delete paired descriptor")?;
                None
            }
        };

        match descriptor {
            Some(descriptor) => {
                let link = manager.clone();
                let mut session =
                    tokio::spawn(async move { link.connect(&descriptor.server_ws).await });

                let exit = tokio::select! {
                    exit = &mut session => exit.context("Session task failed")?,
                    _ = shutdown.cancelled() => {
                        manager.shutdown(true).await;
                        session.await.context("Session task failed")?
                    }
                };
                match exit {
                    LinkExit::Shutdown => break,
                    LinkExit::Unpaired => info!("Controller link ended, returning to pairing"),
                }
            }
            None => {
                info!(port = config.listen_port, "Not paired, waiting for a controller");
                // Cancelled by a successful confirmation or by process shutdown.
                let stop = shutdown.child_token();
                run_pairing_server(coordinator.clone(), pairing_addr, stop).await?;
            }
        }
    }

    coordinator.stop_sweeper();
    info!("screenlink agent stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C stops the agent");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
