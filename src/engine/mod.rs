//! The trade engine: balances, reconciliation, execution and decisions.

pub mod balances;
pub mod decision;
pub mod executor;
pub mod monitor;

pub use balances::BalanceBook;
pub use decision::{combine_signals, evaluate_period, DecisionEngine, PeriodSignal};
pub use executor::OrderExecutor;
pub use monitor::{OrderMonitor, FILL_WINDOW};

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info};

use crate::audit::AuditSink;
use crate::book::BookHandle;
use crate::config::{EngineConfig, ExecutionConfig};
use crate::domain::{Fill, Product};
use crate::error::{BotError, Result};
use crate::exchange::ExchangeClient;
use crate::indicators::PeriodSnapshot;

/// Owns the traded instruments and orchestrates the engine lifecycle.
pub struct TradeEngine {
    client: Arc<dyn ExchangeClient>,
    products: Vec<Arc<Product>>,
    balances: Arc<BalanceBook>,
    recent_fills: Arc<RwLock<Vec<Fill>>>,
    monitor: Arc<OrderMonitor>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    decision: DecisionEngine,
}

impl TradeEngine {
    /// Build an engine for the configured instruments.
    ///
    /// Instrument metadata (currency codes, tick size, minimum size) comes
    /// from the exchange's product list; an id the exchange does not carry
    /// is a configuration error.
    pub async fn new(
        client: Arc<dyn ExchangeClient>,
        audit: Arc<dyn AuditSink>,
        engine_config: &EngineConfig,
        execution_config: &ExecutionConfig,
    ) -> Result<Self> {
        let tick = Duration::from_millis(execution_config.tick_ms);
        let refresh = Duration::from_millis(execution_config.refresh_interval_ms);

        let available = client.get_products().await?;
        let mut products = Vec::with_capacity(engine_config.products.len());
        for id in &engine_config.products {
            let info = available
                .iter()
                .find(|info| &info.id == id)
                .ok_or_else(|| BotError::UnknownProduct(id.clone()))?;
            products.push(Arc::new(Product::new(info.clone(), BookHandle::new())));
        }

        let recent_fills = Arc::new(RwLock::new(Vec::new()));
        let balances = Arc::new(BalanceBook::new(
            client.clone(),
            audit.clone(),
            engine_config.fiat_currency.clone(),
            refresh,
            products.clone(),
            recent_fills.clone(),
        ));
        balances.refresh().await;

        let executor = Arc::new(OrderExecutor::new(
            client.clone(),
            balances.clone(),
            engine_config.max_slippage_pct,
            tick,
            refresh,
        ));
        let monitor = Arc::new(OrderMonitor::new(
            client.clone(),
            products.clone(),
            recent_fills.clone(),
            tick,
            refresh,
        ));
        let decision = DecisionEngine::new(
            client.clone(),
            balances.clone(),
            executor,
            audit,
            recent_fills.clone(),
            engine_config.fiat_currency.clone(),
            engine_config.live,
            engine_config.market_orders,
            engine_config.fee_rate,
        );

        Ok(Self {
            client,
            products,
            balances,
            recent_fills,
            monitor,
            monitor_handle: Mutex::new(None),
            decision,
        })
    }

    /// Start the background reconciliation loop.
    pub async fn start(&self) {
        let handle = self.monitor.spawn();
        *self.monitor_handle.lock().await = Some(handle);
    }

    pub fn product(&self, product_id: &str) -> Option<&Arc<Product>> {
        self.products.iter().find(|p| p.id == product_id)
    }

    pub fn products(&self) -> &[Arc<Product>] {
        &self.products
    }

    pub fn balances(&self) -> &Arc<BalanceBook> {
        &self.balances
    }

    pub async fn recent_fills(&self) -> Vec<Fill> {
        self.recent_fills.read().await.clone()
    }

    /// Run one decision cycle for an instrument.
    pub async fn decide(&self, product_id: &str, periods: &[PeriodSnapshot]) -> Result<()> {
        let product = self
            .product(product_id)
            .ok_or_else(|| BotError::UnknownProduct(product_id.to_string()))?;
        self.decision.decide(product, periods).await
    }

    /// Wind down trading: clear every intent flag (execution tasks notice
    /// within one tick and cancel their own orders), then sweep any
    /// remaining orders exchange-wide. With `exit` the monitor loop stops
    /// too.
    pub async fn close(&self, exit: bool) {
        info!(exit, "closing trade engine");
        for product in &self.products {
            product.set_buy_flag(false);
            product.set_sell_flag(false);
        }
        if let Err(e) = self.client.cancel_all(None).await {
            error!("close-time cancel-all failed: {e}");
        }
        if exit {
            self.monitor.stop();
            if let Some(handle) = self.monitor_handle.lock().await.take() {
                if let Err(e) = handle.await {
                    error!("monitor task join failed: {e}");
                }
            }
        }
    }
}
