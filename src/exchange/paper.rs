//! In-memory exchange used for simulate mode and tests.
//!
//! Holds seeded balances, resting orders and a fill history, and exposes
//! helper setters so tests can stage exchange-side state (fills, statuses,
//! transport failures) without a network.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Fill, Order, OrderSide, OrderStatus, ProductInfo};
use crate::error::{BotError, Result};
use crate::exchange::{Account, ExchangeClient, MarketAmount};

#[derive(Default)]
struct PaperState {
    accounts: HashMap<String, Decimal>,
    /// Every order ever accepted, by exchange id
    orders: HashMap<String, Order>,
    /// Per-product fill history, newest first
    fills: HashMap<String, Vec<Fill>>,
    cancelled: Vec<String>,
    market_orders: Vec<Order>,
    /// `get_accounts` attempts, including failed ones
    accounts_calls: usize,
    /// When set, every client call fails until cleared
    offline: bool,
}

/// Paper-trading implementation of [`ExchangeClient`].
pub struct PaperExchange {
    products: Vec<ProductInfo>,
    state: RwLock<PaperState>,
}

impl PaperExchange {
    pub fn new(products: Vec<ProductInfo>) -> Self {
        Self {
            products,
            state: RwLock::new(PaperState::default()),
        }
    }

    /// Standard BTC-USD product metadata for demos and tests.
    pub fn btc_usd_info() -> ProductInfo {
        ProductInfo {
            id: "BTC-USD".to_string(),
            base_currency: "BTC".to_string(),
            quote_currency: "USD".to_string(),
            quote_increment: Decimal::new(1, 2),  // 0.01
            min_size: Decimal::new(1, 3),         // 0.001
        }
    }

    pub async fn set_balance(&self, currency: &str, available: Decimal) {
        self.state
            .write()
            .await
            .accounts
            .insert(currency.to_string(), available);
    }

    /// Stage a fill in the product's history (newest first).
    pub async fn push_fill(&self, fill: Fill) {
        let mut state = self.state.write().await;
        state
            .fills
            .entry(fill.product_id.clone())
            .or_default()
            .insert(0, fill);
    }

    /// Force an order into a given status, emulating exchange-side progress
    /// (fills, rejections) between engine polls.
    pub async fn set_order_status(&self, order_id: &str, status: OrderStatus) {
        if let Some(order) = self.state.write().await.orders.get_mut(order_id) {
            order.status = status;
        }
    }

    /// Make every subsequent call fail until `set_offline(false)`.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    pub async fn cancelled_ids(&self) -> Vec<String> {
        self.state.read().await.cancelled.clone()
    }

    /// How many times `get_accounts` has been attempted, offline included.
    pub async fn accounts_call_count(&self) -> usize {
        self.state.read().await.accounts_calls
    }

    pub async fn market_orders(&self) -> Vec<Order> {
        self.state.read().await.market_orders.clone()
    }

    pub async fn resting_order_count(&self) -> usize {
        self.state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status.is_resting())
            .count()
    }

    fn check_online(state: &PaperState) -> Result<()> {
        if state.offline {
            return Err(BotError::Exchange("paper exchange offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn get_accounts(&self) -> Result<Vec<Account>> {
        let mut state = self.state.write().await;
        state.accounts_calls += 1;
        Self::check_online(&state)?;
        Ok(state
            .accounts
            .iter()
            .map(|(currency, available)| Account {
                currency: currency.clone(),
                available: *available,
            })
            .collect())
    }

    async fn get_products(&self) -> Result<Vec<ProductInfo>> {
        let state = self.state.read().await;
        Self::check_online(&state)?;
        Ok(self.products.clone())
    }

    async fn get_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Self::check_online(&state)?;
        Ok(state
            .orders
            .values()
            .filter(|o| o.status.is_resting())
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_id: &str) -> Result<Order> {
        let state = self.state.read().await;
        Self::check_online(&state)?;
        state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| BotError::OrderNotFound(order_id.to_string()))
    }

    async fn get_fills(&self, product_id: &str, limit: usize) -> Result<Vec<Fill>> {
        let state = self.state.read().await;
        Self::check_online(&state)?;
        Ok(state
            .fills
            .get(product_id)
            .map(|fills| fills.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn place_limit_order(
        &self,
        product_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
        post_only: bool,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        Self::check_online(&state)?;
        let order = Order {
            id: Some(Uuid::new_v4().to_string()),
            product_id: product_id.to_string(),
            side,
            price: Some(price),
            size: Some(size),
            status: OrderStatus::Open,
            created_at: Utc::now(),
        };
        debug!(
            product_id,
            %side,
            %size,
            %price,
            post_only,
            "paper limit order accepted"
        );
        if let Some(id) = &order.id {
            state.orders.insert(id.clone(), order.clone());
        }
        Ok(order)
    }

    async fn place_market_order(
        &self,
        product_id: &str,
        side: OrderSide,
        amount: MarketAmount,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        Self::check_online(&state)?;
        let (size, funds) = match amount {
            MarketAmount::Size(size) => (Some(size), None),
            MarketAmount::Funds(funds) => (None, Some(funds)),
        };
        let order = Order {
            id: Some(Uuid::new_v4().to_string()),
            product_id: product_id.to_string(),
            side,
            price: None,
            size,
            status: OrderStatus::Done,
            created_at: Utc::now(),
        };
        debug!(product_id, %side, ?size, ?funds, "paper market order filled");
        if let Some(id) = &order.id {
            state.orders.insert(id.clone(), order.clone());
        }
        state.market_orders.push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_online(&state)?;
        match state.orders.get_mut(order_id) {
            Some(order) if order.status.is_resting() => {
                order.status = OrderStatus::Cancelled;
                state.cancelled.push(order_id.to_string());
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(BotError::OrderNotFound(order_id.to_string())),
        }
    }

    async fn cancel_all(&self, product_id: Option<&str>) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        Self::check_online(&state)?;
        let ids: Vec<String> = state
            .orders
            .values()
            .filter(|o| o.status.is_resting())
            .filter(|o| product_id.map_or(true, |p| o.product_id == p))
            .filter_map(|o| o.id.clone())
            .collect();
        for id in &ids {
            if let Some(order) = state.orders.get_mut(id) {
                order.status = OrderStatus::Cancelled;
            }
            state.cancelled.push(id.clone());
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exchange() -> PaperExchange {
        PaperExchange::new(vec![PaperExchange::btc_usd_info()])
    }

    #[tokio::test]
    async fn limit_orders_rest_until_cancelled() {
        let ex = exchange();
        let order = ex
            .place_limit_order("BTC-USD", OrderSide::Buy, dec!(0.01), dec!(100.00), true)
            .await
            .expect("place");
        assert_eq!(ex.resting_order_count().await, 1);

        let id = order.id.expect("paper orders always get ids");
        ex.cancel_order(&id).await.expect("cancel");
        assert_eq!(ex.resting_order_count().await, 0);
        assert_eq!(ex.cancelled_ids().await, vec![id]);
    }

    #[tokio::test]
    async fn cancel_all_scopes_to_product() {
        let ex = PaperExchange::new(vec![
            PaperExchange::btc_usd_info(),
            ProductInfo {
                id: "ETH-USD".into(),
                base_currency: "ETH".into(),
                quote_currency: "USD".into(),
                quote_increment: dec!(0.01),
                min_size: dec!(0.01),
            },
        ]);
        ex.place_limit_order("BTC-USD", OrderSide::Buy, dec!(0.01), dec!(100), true)
            .await
            .expect("place btc");
        ex.place_limit_order("ETH-USD", OrderSide::Buy, dec!(0.5), dec!(10), true)
            .await
            .expect("place eth");

        let cancelled = ex.cancel_all(Some("BTC-USD")).await.expect("cancel all");
        assert_eq!(cancelled.len(), 1);
        assert_eq!(ex.resting_order_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_order_id_is_not_found() {
        let ex = exchange();
        let err = ex.get_order("nope").await.expect_err("missing order");
        assert!(matches!(err, BotError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn offline_mode_fails_every_call() {
        let ex = exchange();
        ex.set_balance("USD", dec!(100)).await;
        ex.set_offline(true).await;
        assert!(ex.get_accounts().await.is_err());
        ex.set_offline(false).await;
        assert_eq!(ex.get_accounts().await.expect("online").len(), 1);
    }
}
