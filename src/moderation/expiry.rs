//! Background task that reverses restrictions once they run out

use crate::moderation::ModerationService;
use chrono::Utc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info};

/// Requests the expiry task understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryRequest {
    /// Expire everything due right now
    CheckAll,
    /// Finish interrupted upgrades
    Reconcile,
    Shutdown,
}

/// Start the expiry task. It reconciles once, then checks on every tick of
/// `check_interval` and whenever a request arrives.
pub fn spawn_expiry_task(
    service: ModerationService,
    check_interval: Duration,
) -> (Sender<ExpiryRequest>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<ExpiryRequest>(100);
    let handle = tokio::spawn(expiry_task(service, rx, check_interval));
    (tx, handle)
}

async fn expiry_task(
    service: ModerationService,
    mut rx: Receiver<ExpiryRequest>,
    check_interval: Duration,
) {
    info!(
        "Starting expiry task with {}s interval",
        check_interval.as_secs()
    );

    let repaired = service.reconcile().await;
    if repaired > 0 {
        info!("Repaired {repaired} interrupted upgrade(s) on startup");
    }

    let mut interval = tokio::time::interval(check_interval);

    loop {
        tokio::select! {
            request = rx.recv() => {
                match request {
                    Some(ExpiryRequest::CheckAll) => {
                        info!("Received request to check all restrictions");
                        run_check(&service).await;
                    }
                    Some(ExpiryRequest::Reconcile) => {
                        let repaired = service.reconcile().await;
                        info!("Reconcile repaired {repaired} upgrade(s)");
                    }
                    Some(ExpiryRequest::Shutdown) => {
                        info!("Received shutdown request for expiry task");
                        break;
                    }
                    None => {
                        error!("Expiry request channel closed");
                        break;
                    }
                }
            }

            _ = interval.tick() => {
                debug!("Performing periodic expiry check");
                run_check(&service).await;
            }
        }
    }

    info!("Expiry task shut down");
}

async fn run_check(service: &ModerationService) {
    let expired = service.expire_due(Utc::now()).await;
    for record in &expired {
        info!(
            record_id = record.id,
            kind = %record.kind,
            member = record.member,
            "Restriction expired"
        );
    }
}
