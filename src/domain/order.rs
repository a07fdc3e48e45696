use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order status as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted but not yet on the book
    Pending,
    /// Resting on the book
    Open,
    /// Fully executed or settled
    Done,
    /// Rejected by the exchange (e.g., post-only would have crossed)
    Rejected,
    /// Cancelled before completion
    Cancelled,
    /// The exchange no longer knows the id
    NotFound,
}

impl OrderStatus {
    /// Terminal statuses trigger replacement in the execution loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Done | OrderStatus::Rejected | OrderStatus::Cancelled | OrderStatus::NotFound
        )
    }

    pub fn is_resting(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Open)
    }
}

/// An order as known to the engine.
///
/// The exchange owns the authoritative copy; between status refreshes this
/// one may be stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned id; absent until the order is accepted
    pub id: Option<String>,
    pub product_id: String,
    pub side: OrderSide,
    /// Limit price; absent for market orders
    pub price: Option<Decimal>,
    /// Base-currency size; absent for funds-denominated market buys
    pub size: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Marker returned when a placement is skipped because the computed size
    /// is below the exchange minimum. Carries no id and makes no claim about
    /// the book; the execution loop treats it like any other terminal order.
    pub fn skipped(product_id: &str, side: OrderSide) -> Self {
        Self {
            id: None,
            product_id: product_id.to_string(),
            side,
            price: None,
            size: None,
            status: OrderStatus::Done,
            created_at: Utc::now(),
        }
    }
}

/// A completed trade execution against one of our orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: String,
    pub product_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
}
