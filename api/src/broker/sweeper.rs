use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::BrokerService;

/// Periodically moves overdue pending requests to `expired`.
///
/// Answer attempts and reads detect expiry on their own; the sweep only keeps
/// the table from accumulating stale `pending` rows nobody looks at.
pub fn spawn_expiry_sweeper(broker: Arc<BrokerService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(&broker).await;
        }
    })
}

async fn sweep_once(broker: &BrokerService) {
    match broker.expire_overdue(Utc::now()).await {
        Ok(0) => {}
        Ok(expired) => tracing::info!(expired, "expired overdue user input requests"),
        Err(e) => tracing::error!(error = %e, "user input expiry sweep failed"),
    }
}
