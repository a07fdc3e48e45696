//! Fire-and-forget audit sinks.
//!
//! The engine reports what it is doing (indicator evaluations, fill
//! snapshots, order placements) to an [`AuditSink`]; storage lives behind
//! the trait. Sink failures never affect engine state, so the trait methods
//! are infallible from the caller's point of view.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::Fill;
use crate::indicators::PeriodSnapshot;

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one period's indicator values with the resulting intent flags.
    async fn log_indicators(
        &self,
        snapshot: &PeriodSnapshot,
        buy_flag: bool,
        sell_flag: bool,
        sell_point: Option<Decimal>,
    );

    /// Record the current recent-fills window.
    async fn log_fills(&self, fills: &[Fill]);

    async fn placing_buy(&self);

    async fn placing_sell(&self);
}

/// Audit sink that writes structured log lines instead of a database.
#[derive(Debug, Default, Clone)]
pub struct TracingAudit;

#[async_trait]
impl AuditSink for TracingAudit {
    async fn log_indicators(
        &self,
        snapshot: &PeriodSnapshot,
        buy_flag: bool,
        sell_flag: bool,
        sell_point: Option<Decimal>,
    ) {
        debug!(
            period = %snapshot.period,
            close = %snapshot.close,
            sma_trend = %snapshot.sma_trend,
            bband_lower = %snapshot.bband_lower_1,
            bband_upper = %snapshot.bband_upper_1,
            buy_flag,
            sell_flag,
            ?sell_point,
            "indicator evaluation"
        );
    }

    async fn log_fills(&self, fills: &[Fill]) {
        debug!(count = fills.len(), "recent fills snapshot");
    }

    async fn placing_buy(&self) {
        info!("placing buy");
    }

    async fn placing_sell(&self) {
        info!("placing sell");
    }
}
