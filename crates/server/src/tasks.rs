use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vendedor_agent::MessageOrchestrator;
use vendedor_core::domain::customer::CustomerId;
use vendedor_core::domain::discount::DiscountQuote;
use vendedor_core::rate_limit::RateLimiter;
use vendedor_db::RepositoryError;
use vendedor_transport::ConnectionSupervisor;

/// An idle cart together with the win-back offer it qualifies for.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AbandonedCartReport {
    pub customer_id: CustomerId,
    pub item_count: u32,
    pub final_total: Decimal,
    pub idle_hours: f64,
    pub offer: DiscountQuote,
}

pub async fn abandoned_cart_reports_at(
    orchestrator: &MessageOrchestrator,
    threshold: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<Vec<AbandonedCartReport>, RepositoryError> {
    let carts = orchestrator.carts().abandoned_carts_at(threshold, now).await?;
    Ok(carts
        .into_iter()
        .map(|cart| {
            let idle_hours = cart.hours_since_update(now);
            let offer =
                orchestrator.discounts().abandoned_cart_quote_at(cart.final_total, idle_hours, now);
            AbandonedCartReport {
                item_count: cart.item_count(),
                final_total: cart.final_total,
                idle_hours,
                offer,
                customer_id: cart.customer_id,
            }
        })
        .collect())
}

/// Runs `tick` on every interval until `cancel` fires. The immediate first tick is skipped.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    every: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                _ = cancel.cancelled() => {
                    info!(
                        event_name = "system.task.stopped",
                        correlation_id = "shutdown",
                        task = name,
                        "background task shutting down"
                    );
                    break;
                }
            }
        }
    })
}

pub fn spawn_rate_limit_sweep(
    rate_limiter: Arc<RateLimiter>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_periodic("rate_limit_sweep", every, cancel, move || {
        let rate_limiter = Arc::clone(&rate_limiter);
        async move {
            let removed = rate_limiter.sweep();
            debug!(
                event_name = "system.rate_limit.swept",
                correlation_id = "background",
                removed,
                tracked = rate_limiter.tracked_senders(),
                "expired rate limit windows removed"
            );
        }
    })
}

pub fn spawn_abandoned_cart_monitor(
    orchestrator: Arc<MessageOrchestrator>,
    threshold: chrono::Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_periodic("abandoned_cart_monitor", every, cancel, move || {
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            match abandoned_cart_reports_at(&orchestrator, threshold, Utc::now()).await {
                Ok(reports) => {
                    for report in &reports {
                        warn!(
                            event_name = "system.cart.abandoned_detected",
                            correlation_id = "background",
                            customer_id = %report.customer_id,
                            item_count = report.item_count,
                            final_total = %report.final_total,
                            idle_hours = report.idle_hours,
                            offer_pct = report.offer.discount_pct,
                            offer_code = %report.offer.code,
                            "abandoned cart detected"
                        );
                    }
                }
                Err(error) => warn!(
                    event_name = "system.cart.scan_failed",
                    correlation_id = "background",
                    error = %error,
                    "abandoned cart scan failed"
                ),
            }
        }
    })
}

pub fn spawn_status_heartbeat(
    supervisor: Arc<ConnectionSupervisor>,
    rate_limiter: Arc<RateLimiter>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_periodic("status_heartbeat", every, cancel, move || {
        let status = supervisor.status();
        let tracked = rate_limiter.tracked_senders();
        async move {
            info!(
                event_name = "system.status.heartbeat",
                correlation_id = "background",
                connected = status.connected,
                state = ?status.state,
                reconnect_attempts = status.reconnect_attempts,
                rate_limited_senders = tracked,
                "status heartbeat"
            );
        }
    })
}
