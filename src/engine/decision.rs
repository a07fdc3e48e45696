//! Indicator-driven buy/sell decisions.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::audit::AuditSink;
use crate::domain::{round_coin, round_fiat, Fill, OrderSide, Product};
use crate::engine::{BalanceBook, OrderExecutor};
use crate::error::Result;
use crate::exchange::{ExchangeClient, MarketAmount};
use crate::indicators::{break_even_price, sell_point, PeriodSnapshot};

/// Derived per-period view the intent combination runs on.
#[derive(Debug, Clone)]
pub struct PeriodSignal {
    pub period: String,
    pub trend_rising: bool,
    pub above_market_bottom: bool,
    pub emergency_sell: bool,
    pub profit_expected: bool,
    pub profiting: bool,
}

/// Evaluate one period's snapshot against the current position context.
pub fn evaluate_period(
    snapshot: &PeriodSnapshot,
    last_purchase_price: Option<Decimal>,
    fiat_balance: Decimal,
    fee_rate: Decimal,
    target_sell_price: Option<Decimal>,
) -> PeriodSignal {
    let above_market_bottom = snapshot.close >= snapshot.bband_lower_1;

    let incurring_losses = last_purchase_price.map_or(false, |price| snapshot.close < price);
    let emergency_sell = !above_market_bottom && incurring_losses;

    // A hypothetical full-balance buy here is only worth it if its
    // break-even price sits under the upper band estimate.
    let profit_expected = break_even_price(fiat_balance, snapshot.close, fee_rate)
        .map_or(false, |bep| bep.ceil() < snapshot.bband_upper_1.ceil());

    let profiting = target_sell_price.map_or(false, |target| snapshot.close > target);

    PeriodSignal {
        period: snapshot.period.clone(),
        trend_rising: snapshot.sma_trend > Decimal::ZERO,
        above_market_bottom,
        emergency_sell,
        profit_expected,
        profiting,
    }
}

/// Combine per-period signals into final intents: buy needs consensus from
/// every period, sell needs any period, and buy suppresses sell.
pub fn combine_signals(signals: &[PeriodSignal]) -> (bool, bool) {
    if signals.is_empty() {
        return (false, false);
    }
    let buy = signals
        .iter()
        .all(|s| s.above_market_bottom && s.profit_expected);
    let sell = signals.iter().any(|s| s.emergency_sell || s.profiting) && !buy;
    (buy, sell)
}

/// Turns indicator snapshots into intent flags and launches executions.
pub struct DecisionEngine {
    client: Arc<dyn ExchangeClient>,
    balances: Arc<BalanceBook>,
    executor: Arc<OrderExecutor>,
    audit: Arc<dyn AuditSink>,
    recent_fills: Arc<RwLock<Vec<Fill>>>,
    fiat_currency: String,
    live: bool,
    market_orders: bool,
    fee_rate: Decimal,
}

impl DecisionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        balances: Arc<BalanceBook>,
        executor: Arc<OrderExecutor>,
        audit: Arc<dyn AuditSink>,
        recent_fills: Arc<RwLock<Vec<Fill>>>,
        fiat_currency: String,
        live: bool,
        market_orders: bool,
        fee_rate: Decimal,
    ) -> Self {
        Self {
            client,
            balances,
            executor,
            audit,
            recent_fills,
            fiat_currency,
            live,
            market_orders,
            fee_rate,
        }
    }

    /// Run one decision cycle for `product` over the given period snapshots.
    ///
    /// Guarantees that buy and sell intent are never both set afterwards.
    pub async fn decide(
        &self,
        product: &Arc<Product>,
        periods: &[PeriodSnapshot],
    ) -> Result<()> {
        self.balances.refresh().await;

        if !self.live {
            return Ok(());
        }

        let fills = self.recent_fills.read().await.clone();
        let last_purchase_price = fills
            .iter()
            .find(|f| f.side == OrderSide::Buy)
            .map(|f| f.price);
        let target_sell_price = sell_point(&fills);
        let fiat_balance = self.balances.balance(&self.fiat_currency).await;

        let signals: Vec<PeriodSignal> = periods
            .iter()
            .map(|snapshot| {
                evaluate_period(
                    snapshot,
                    last_purchase_price,
                    fiat_balance,
                    self.fee_rate,
                    target_sell_price,
                )
            })
            .collect();
        let (buy, sell) = combine_signals(&signals);

        for snapshot in periods {
            self.audit
                .log_indicators(snapshot, buy, sell, target_sell_price)
                .await;
        }

        if buy {
            self.audit.placing_buy().await;
            if !product.buy_flag() {
                product.mark_signal_switch().await;
            }
            product.set_sell_flag(false);
            product.set_buy_flag(true);
            self.launch_buy(product).await?;
        } else if sell {
            self.audit.placing_sell().await;
            if !product.sell_flag() {
                product.mark_signal_switch().await;
            }
            product.set_buy_flag(false);
            product.set_sell_flag(true);
            self.launch_sell(product).await?;
        } else {
            product.set_buy_flag(false);
            product.set_sell_flag(false);
        }

        Ok(())
    }

    async fn launch_buy(&self, product: &Arc<Product>) -> Result<()> {
        let amount = round_fiat(self.balances.balance(&product.quote_currency).await);
        if amount < product.min_size {
            debug!(product_id = %product.id, %amount, "buy funds below minimum");
            return Ok(());
        }
        if self.market_orders {
            let order = self
                .client
                .place_market_order(&product.id, OrderSide::Buy, MarketAmount::Funds(amount))
                .await?;
            debug!(product_id = %product.id, ?order.id, %amount, "market buy placed");
        } else if !product.order_in_progress() {
            let executor = self.executor.clone();
            let product = product.clone();
            tokio::spawn(async move {
                if let Err(e) = executor.buy(&product).await {
                    error!(product_id = %product.id, "buy execution task failed: {e}");
                }
            });
        }
        Ok(())
    }

    async fn launch_sell(&self, product: &Arc<Product>) -> Result<()> {
        let amount = round_coin(self.balances.balance(&product.base_currency).await);
        if amount < product.min_size {
            debug!(product_id = %product.id, %amount, "sell inventory below minimum");
            return Ok(());
        }
        if self.market_orders {
            let order = self
                .client
                .place_market_order(&product.id, OrderSide::Sell, MarketAmount::Size(amount))
                .await?;
            debug!(product_id = %product.id, ?order.id, %amount, "market sell placed");
        } else if !product.order_in_progress() {
            let executor = self.executor.clone();
            let product = product.clone();
            tokio::spawn(async move {
                if let Err(e) = executor.sell(&product).await {
                    error!(product_id = %product.id, "sell execution task failed: {e}");
                }
            });
        }
        Ok(())
    }
}
