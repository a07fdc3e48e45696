use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Fill, Order, OrderSide, ProductInfo};
use crate::error::Result;

/// One currency balance as reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub currency: String,
    /// Amount not locked by open orders
    pub available: Decimal,
}

/// Amount specification for market orders: base-currency size (sells) or
/// quote-currency funds (buys).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketAmount {
    Size(Decimal),
    Funds(Decimal),
}

/// Authenticated exchange client boundary.
///
/// Every method may fail; the engine treats transport failures as transient
/// and retries on its next tick. `get_order` on an id the exchange no longer
/// knows returns [`crate::error::BotError::OrderNotFound`], which the
/// execution loop folds into the `NotFound` terminal status rather than
/// treating as an error.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_accounts(&self) -> Result<Vec<Account>>;

    async fn get_products(&self) -> Result<Vec<ProductInfo>>;

    /// All currently resting orders, across products.
    async fn get_orders(&self) -> Result<Vec<Order>>;

    async fn get_order(&self, order_id: &str) -> Result<Order>;

    /// Most recent fills for a product, newest first, at most `limit`.
    async fn get_fills(&self, product_id: &str, limit: usize) -> Result<Vec<Fill>>;

    async fn place_limit_order(
        &self,
        product_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
        post_only: bool,
    ) -> Result<Order>;

    async fn place_market_order(
        &self,
        product_id: &str,
        side: OrderSide,
        amount: MarketAmount,
    ) -> Result<Order>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Cancel every resting order, optionally scoped to one product.
    /// Returns the cancelled ids.
    async fn cancel_all(&self, product_id: Option<&str>) -> Result<Vec<String>>;
}
