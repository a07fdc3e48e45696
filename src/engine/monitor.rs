//! Order and fill reconciliation background service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::{Fill, Order, Product};
use crate::exchange::ExchangeClient;

/// Fills retained across all products, newest first.
pub const FILL_WINDOW: usize = 5;

/// Long-lived background task reconciling locally-known open orders and
/// recent fills against exchange-authoritative state.
///
/// Transient exchange errors are logged and swallowed; the loop only exits
/// on [`OrderMonitor::stop`]. Persistent failure just means fills and open
/// orders go stale, which every consumer tolerates.
pub struct OrderMonitor {
    client: Arc<dyn ExchangeClient>,
    products: Vec<Arc<Product>>,
    recent_fills: Arc<RwLock<Vec<Fill>>>,
    tick: Duration,
    refresh_interval: Duration,
    running: Arc<AtomicBool>,
    last_refresh: Mutex<Option<Instant>>,
}

impl OrderMonitor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        products: Vec<Arc<Product>>,
        recent_fills: Arc<RwLock<Vec<Fill>>>,
        tick: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            client,
            products,
            recent_fills,
            tick,
            refresh_interval,
            running: Arc::new(AtomicBool::new(false)),
            last_refresh: Mutex::new(None),
        }
    }

    /// Start the monitoring loop.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("order monitor already running");
            return tokio::spawn(async {});
        }

        info!(
            tick_ms = self.tick.as_millis() as u64,
            refresh_ms = self.refresh_interval.as_millis() as u64,
            "starting order monitor"
        );

        let monitor = self.clone();
        tokio::spawn(async move {
            while monitor.running.load(Ordering::SeqCst) {
                let due = {
                    let last = monitor.last_refresh.lock().await;
                    last.map_or(true, |t| t.elapsed() >= monitor.refresh_interval)
                };
                if due {
                    monitor.refresh_once().await;
                }
                tokio::time::sleep(monitor.tick).await;
            }
            info!("order monitor stopped");
        })
    }

    /// Stop the monitoring loop; takes effect within one tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One reconciliation pass. Public so callers (and tests) can force a
    /// pass outside the loop cadence.
    pub async fn refresh_once(&self) {
        let need_update = self.products.iter().any(|p| p.order_in_progress());

        match self.collect_recent_fills().await {
            Ok(fills) => *self.recent_fills.write().await = fills,
            Err(e) => warn!("fills refresh failed, keeping previous window: {e}"),
        }

        if need_update {
            match self.client.get_orders().await {
                Ok(orders) => self.partition_open_orders(orders).await,
                Err(e) => warn!("open-orders refresh failed: {e}"),
            }
        } else {
            // No execution task owns any instrument, so by the cleanup
            // contract nothing can be resting; reflect that locally without
            // a network round trip.
            for product in &self.products {
                product.clear_open_orders().await;
            }
        }

        *self.last_refresh.lock().await = Some(Instant::now());
    }

    /// Merge each product's most recent fills into the global window.
    async fn collect_recent_fills(&self) -> crate::error::Result<Vec<Fill>> {
        let mut merged = Vec::new();
        for product in &self.products {
            let mut fills = self.client.get_fills(&product.id, FILL_WINDOW).await?;
            merged.append(&mut fills);
        }
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        merged.truncate(FILL_WINDOW);
        Ok(merged)
    }

    async fn partition_open_orders(&self, orders: Vec<Order>) {
        for product in &self.products {
            let mine: Vec<Order> = orders
                .iter()
                .filter(|o| o.product_id == product.id)
                .cloned()
                .collect();
            debug!(product_id = %product.id, open = mine.len(), "open orders reconciled");
            product.set_open_orders(mine).await;
        }
    }
}
