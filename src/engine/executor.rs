//! Adaptive limit-order execution.
//!
//! One execution task per instrument drives a post-only limit order toward
//! completion: it starts one tick inside the spread with half the available
//! funds, chases favorable price moves, replaces terminal orders, and falls
//! back to a market order once the market has slipped past the configured
//! bound. Every exit path, including errors, funnels through a single
//! cleanup step that cancels the instrument's remaining orders and releases
//! the `order_in_progress` claim.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::{round_coin, round_fiat, Order, OrderSide, OrderStatus, Product};
use crate::engine::BalanceBook;
use crate::error::{BotError, Result};
use crate::exchange::{ExchangeClient, MarketAmount};

/// How an execution run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The intent flag cleared or funds ran out with nothing resting
    Drained,
    /// The slippage guard fired and a market order took the remainder
    MarketEscape,
}

pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    balances: Arc<BalanceBook>,
    /// Maximum tolerated adverse move from the entry reference price, percent
    max_slippage_pct: Decimal,
    tick: Duration,
    status_refresh_interval: Duration,
}

impl OrderExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        balances: Arc<BalanceBook>,
        max_slippage_pct: Decimal,
        tick: Duration,
        status_refresh_interval: Duration,
    ) -> Self {
        Self {
            client,
            balances,
            max_slippage_pct,
            tick,
            status_refresh_interval,
        }
    }

    /// Drive an adaptive limit buy for `product` until its buy intent clears
    /// or the funds are spent. See module docs for the protocol.
    pub async fn buy(&self, product: &Product) -> Result<()> {
        self.execute(product, OrderSide::Buy).await
    }

    /// Mirror of [`OrderExecutor::buy`] for the sell side.
    pub async fn sell(&self, product: &Product) -> Result<()> {
        self.execute(product, OrderSide::Sell).await
    }

    async fn execute(&self, product: &Product, side: OrderSide) -> Result<()> {
        if !product.begin_execution() {
            warn!(product_id = %product.id, "execution already in progress, skipping");
            return Ok(());
        }

        let result = self.run(product, side).await;

        // Cleanup runs exactly once, no matter how the run ended: cancel
        // whatever is still resting, then release the instrument.
        if let Err(e) = self.client.cancel_all(Some(&product.id)).await {
            warn!(product_id = %product.id, "cleanup cancel-all failed: {e}");
        }
        product.clear_open_orders().await;
        product.end_execution();

        match result {
            Ok(outcome) => {
                info!(product_id = %product.id, %side, ?outcome, "execution finished");
                Ok(())
            }
            Err(e) => {
                warn!(product_id = %product.id, %side, "execution aborted: {e}");
                Err(e)
            }
        }
    }

    async fn run(&self, product: &Product, side: OrderSide) -> Result<Outcome> {
        let reference_price = self.maker_price(product, side).await?;
        let mut order = self.place_partial(product, side, dec!(0.5)).await?;
        let mut resting_price = order.price;
        let mut available = self.available(product, side).await;
        let mut last_status_check: Option<Instant> = None;

        while self.intent(product, side)
            && (available >= product.min_size || product.open_order_count().await > 0)
        {
            let maker_price = self.maker_price(product, side).await?;

            if slippage_pct(side, maker_price, reference_price) > self.max_slippage_pct {
                return self.market_escape(product, side, reference_price).await;
            }

            if order.status.is_terminal() {
                order = self.place_partial(product, side, dec!(0.5)).await?;
                resting_price = order.price;
            } else if price_improved(side, resting_price, maker_price) {
                // Consolidate into a full-size order if something is already
                // resting, otherwise leave room to improve again.
                let partial = if product.open_order_count().await > 0 {
                    Decimal::ONE
                } else {
                    dec!(0.5)
                };
                order = self.place_partial(product, side, partial).await?;
                self.cancel_strays(product, order.id.as_deref()).await;
                resting_price = order.price;
            }

            if let Some(id) = order.id.clone() {
                let due = last_status_check
                    .map_or(true, |t| t.elapsed() >= self.status_refresh_interval);
                if due {
                    match self.client.get_order(&id).await {
                        Ok(fresh) => order = fresh,
                        Err(BotError::OrderNotFound(_)) => order.status = OrderStatus::NotFound,
                        // Stale status is acceptable until the next check.
                        Err(e) if e.is_transient() => {
                            debug!(order_id = %id, "status refresh failed: {e}")
                        }
                        Err(e) => warn!(order_id = %id, "status refresh failed: {e}"),
                    }
                    last_status_check = Some(Instant::now());
                }
            }

            available = self.available(product, side).await;
            tokio::time::sleep(self.tick).await;
        }

        Ok(Outcome::Drained)
    }

    /// Submit a post-only limit order one tick inside the spread, sized to
    /// `partial` of the available funds; retries at full size when the
    /// partial is below the exchange minimum. A size still below the minimum
    /// skips the exchange entirely and reports a terminal marker.
    async fn place_partial(
        &self,
        product: &Product,
        side: OrderSide,
        partial: Decimal,
    ) -> Result<Order> {
        let price = self.maker_price(product, side).await?;
        let available = self.available(product, side).await;

        let mut size = self.order_size(side, available * partial, price);
        if size < product.min_size {
            size = self.order_size(side, available, price);
        }
        if size < product.min_size {
            debug!(product_id = %product.id, %side, %size, "below minimum, skipping placement");
            return Ok(Order::skipped(&product.id, side));
        }

        debug!(product_id = %product.id, %side, %price, %size, "placing limit order");
        let order = self
            .client
            .place_limit_order(&product.id, side, size, price, true)
            .await?;
        if order.status.is_resting() {
            product.push_open_order(order.clone()).await;
        }
        Ok(order)
    }

    /// Cancel everything slipped past the bound and take the remainder at
    /// market. Guarantees execution at the cost of price certainty.
    async fn market_escape(
        &self,
        product: &Product,
        side: OrderSide,
        reference_price: Decimal,
    ) -> Result<Outcome> {
        warn!(
            product_id = %product.id,
            %side,
            %reference_price,
            max_slippage_pct = %self.max_slippage_pct,
            "slippage bound exceeded, escaping to market order"
        );
        self.client.cancel_all(Some(&product.id)).await?;
        product.clear_open_orders().await;

        let amount = match side {
            OrderSide::Buy => MarketAmount::Funds(round_fiat(
                self.balances.quoted_funds(product).await,
            )),
            OrderSide::Sell => MarketAmount::Size(round_coin(
                self.balances.base_funds(product).await,
            )),
        };
        self.client
            .place_market_order(&product.id, side, amount)
            .await?;
        Ok(Outcome::MarketEscape)
    }

    /// Cancel open orders that are not the one we intend to keep.
    async fn cancel_strays(&self, product: &Product, keep: Option<&str>) {
        let open = product.open_orders().await;
        for order in &open {
            if let Some(id) = order.id.as_deref() {
                if keep != Some(id) {
                    if let Err(e) = self.client.cancel_order(id).await {
                        debug!(order_id = id, "stray cancel failed: {e}");
                    }
                }
            }
        }
        let kept = open
            .into_iter()
            .filter(|o| o.id.as_deref() == keep)
            .collect();
        product.set_open_orders(kept).await;
    }

    fn intent(&self, product: &Product, side: OrderSide) -> bool {
        match side {
            OrderSide::Buy => product.buy_flag(),
            OrderSide::Sell => product.sell_flag(),
        }
    }

    /// Funds the run may still spend: quote currency for buys, base
    /// inventory for sells.
    async fn available(&self, product: &Product, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.balances.quoted_funds(product).await,
            OrderSide::Sell => self.balances.base_funds(product).await,
        }
    }

    /// The most aggressive maker price currently allowed: one tick inside
    /// the spread on our side of the book.
    async fn maker_price(&self, product: &Product, side: OrderSide) -> Result<Decimal> {
        let quote = product.book.snapshot().await;
        let price = match side {
            OrderSide::Buy => quote.best_ask.map(|ask| ask - product.quote_increment),
            OrderSide::Sell => quote.best_bid.map(|bid| bid + product.quote_increment),
        };
        price.ok_or_else(|| {
            BotError::MarketDataUnavailable(format!("no book for {}", product.id))
        })
    }

    fn order_size(&self, side: OrderSide, available: Decimal, price: Decimal) -> Decimal {
        match side {
            OrderSide::Buy => round_coin(available / price),
            OrderSide::Sell => round_coin(available),
        }
    }
}

/// Adverse move from the entry reference, in percent. Positive values mean
/// the market ran away from us on our side.
fn slippage_pct(side: OrderSide, maker_price: Decimal, reference_price: Decimal) -> Decimal {
    let hundred = dec!(100);
    match side {
        OrderSide::Buy => (maker_price / reference_price - Decimal::ONE) * hundred,
        OrderSide::Sell => (Decimal::ONE - maker_price / reference_price) * hundred,
    }
}

/// Whether the book now allows a better maker price than the resting order.
fn price_improved(side: OrderSide, resting: Option<Decimal>, maker_price: Decimal) -> bool {
    match (side, resting) {
        (_, None) => true,
        (OrderSide::Buy, Some(price)) => price < maker_price,
        (OrderSide::Sell, Some(price)) => price > maker_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAudit;
    use crate::book::BookHandle;
    use crate::domain::Fill;
    use crate::exchange::PaperExchange;
    use tokio::sync::RwLock;

    fn harness() -> (Arc<PaperExchange>, Arc<Product>, OrderExecutor) {
        let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
        let product = Arc::new(Product::new(PaperExchange::btc_usd_info(), BookHandle::new()));
        let balances = Arc::new(BalanceBook::new(
            exchange.clone(),
            Arc::new(TracingAudit),
            "USD".to_string(),
            Duration::from_secs(1),
            vec![product.clone()],
            Arc::new(RwLock::new(Vec::<Fill>::new())),
        ));
        let executor = OrderExecutor::new(
            exchange.clone(),
            balances,
            dec!(0.10),
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        (exchange, product, executor)
    }

    #[test]
    fn slippage_is_signed_per_side() {
        // Buy side: market moved up 0.19% from reference 100.
        assert_eq!(
            slippage_pct(OrderSide::Buy, dec!(100.19), dec!(100)),
            dec!(19) / dec!(100)
        );
        // Sell side: market moved down.
        assert!(slippage_pct(OrderSide::Sell, dec!(99.5), dec!(100)) > dec!(0.4));
        // Favorable moves are negative.
        assert!(slippage_pct(OrderSide::Buy, dec!(99), dec!(100)) < Decimal::ZERO);
    }

    #[test]
    fn repricing_triggers_only_on_improvement() {
        assert!(price_improved(OrderSide::Buy, None, dec!(100)));
        assert!(price_improved(OrderSide::Buy, Some(dec!(99)), dec!(100)));
        assert!(!price_improved(OrderSide::Buy, Some(dec!(100)), dec!(100)));
        assert!(price_improved(OrderSide::Sell, Some(dec!(101)), dec!(100)));
        assert!(!price_improved(OrderSide::Sell, Some(dec!(100)), dec!(100)));
    }

    #[tokio::test]
    async fn below_minimum_size_skips_the_exchange() {
        let (exchange, product, executor) = harness();
        product.book.set_prices(dec!(99.99), dec!(100.00)).await;
        // 0.01 USD buys 0.0000001 BTC at ~100, far below the 0.001 minimum.
        exchange.set_balance("USD", dec!(0.01)).await;

        let order = executor
            .place_partial(&product, OrderSide::Buy, dec!(0.5))
            .await
            .expect("placement");

        assert!(order.status.is_terminal());
        assert!(order.id.is_none());
        assert_eq!(exchange.resting_order_count().await, 0);
    }

    #[tokio::test]
    async fn half_size_placement_retries_at_full_size() {
        let (exchange, product, executor) = harness();
        product.book.set_prices(dec!(99.99), dec!(100.00)).await;
        // Half of 0.15 USD is below minimum, the full amount is not.
        exchange.set_balance("USD", dec!(0.15)).await;

        let order = executor
            .place_partial(&product, OrderSide::Buy, dec!(0.5))
            .await
            .expect("placement");

        assert_eq!(order.size, Some(dec!(0.00150015)));
        assert_eq!(order.price, Some(dec!(99.99)));
        assert_eq!(product.open_order_count().await, 1);
    }

    #[tokio::test]
    async fn slippage_escape_issues_one_market_order_and_cleans_up() {
        let (exchange, product, executor) = harness();
        product.book.set_prices(dec!(100.00), dec!(100.01)).await;
        exchange.set_balance("USD", dec!(1000.00)).await;
        product.set_buy_flag(true);

        let exec = Arc::new(executor);
        let runner = {
            let exec = exec.clone();
            let product = product.clone();
            tokio::spawn(async move { exec.buy(&product).await })
        };

        // Let the initial half order land, then push the ask past the bound:
        // reference is 100.00, maker becomes 100.19, slippage 0.19% > 0.10%.
        tokio::time::sleep(Duration::from_millis(50)).await;
        product.book.set_prices(dec!(100.19), dec!(100.20)).await;

        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("execution should terminate")
            .expect("join")
            .expect("buy run");

        let markets = exchange.market_orders().await;
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].side, OrderSide::Buy);
        assert_eq!(exchange.resting_order_count().await, 0);
        assert!(!product.order_in_progress());
        assert_eq!(product.open_order_count().await, 0);
    }

    #[tokio::test]
    async fn clearing_the_intent_flag_stops_the_run() {
        let (exchange, product, executor) = harness();
        product.book.set_prices(dec!(99.99), dec!(100.00)).await;
        exchange.set_balance("USD", dec!(500.00)).await;
        product.set_buy_flag(true);

        let exec = Arc::new(executor);
        let runner = {
            let exec = exec.clone();
            let product = product.clone();
            tokio::spawn(async move { exec.buy(&product).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(product.order_in_progress());
        product.set_buy_flag(false);

        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("execution should stop within ticks of the flag clearing")
            .expect("join")
            .expect("buy run");

        // Cleanup cancelled the resting half order and released the claim.
        assert_eq!(exchange.resting_order_count().await, 0);
        assert!(!product.order_in_progress());
        assert_eq!(product.open_order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_execution_claim_is_refused() {
        let (exchange, product, executor) = harness();
        product.book.set_prices(dec!(99.99), dec!(100.00)).await;
        exchange.set_balance("USD", dec!(500.00)).await;
        assert!(product.begin_execution());

        // The claimed instrument is left alone entirely.
        executor.buy(&product).await.expect("no-op buy");
        assert!(product.order_in_progress());
        assert_eq!(exchange.resting_order_count().await, 0);
    }

    #[tokio::test]
    async fn sell_places_one_tick_above_best_bid() {
        let (exchange, product, executor) = harness();
        product.book.set_prices(dec!(100.00), dec!(100.01)).await;
        exchange.set_balance("BTC", dec!(0.5)).await;

        let order = executor
            .place_partial(&product, OrderSide::Sell, dec!(0.5))
            .await
            .expect("placement");

        assert_eq!(order.price, Some(dec!(100.01)));
        assert_eq!(order.size, Some(dec!(0.25)));
    }

    #[tokio::test]
    async fn failed_run_still_cleans_up() {
        let (exchange, product, executor) = harness();
        // No book prices: the run errors immediately on the reference price.
        exchange.set_balance("USD", dec!(500.00)).await;
        product.set_buy_flag(true);

        let err = executor.buy(&product).await.expect_err("no market data");
        assert!(matches!(err, BotError::MarketDataUnavailable(_)));
        assert!(!product.order_in_progress());
        assert_eq!(product.open_order_count().await, 0);
    }
}
