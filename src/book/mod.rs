//! Shared view of an instrument's live order book.
//!
//! The engine only ever needs the top of the book. A market-data feed task
//! writes quotes through a [`BookHandle`]; the execution and decision code
//! reads them. Feed internals (websocket, snapshots, sequencing) live
//! outside this crate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Best bid/ask snapshot for one product
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Quote {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Cloneable handle to a product's live top-of-book.
#[derive(Debug, Clone, Default)]
pub struct BookHandle {
    quote: Arc<RwLock<Quote>>,
}

impl BookHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current quote wholesale (feed side).
    pub async fn update(&self, quote: Quote) {
        *self.quote.write().await = quote;
    }

    /// Convenience for tests and the paper feed: set both sides at once.
    pub async fn set_prices(&self, bid: Decimal, ask: Decimal) {
        let mut quote = self.quote.write().await;
        quote.best_bid = Some(bid);
        quote.best_ask = Some(ask);
        quote.last_price = Some(bid);
        quote.timestamp = Some(Utc::now());
    }

    pub async fn snapshot(&self) -> Quote {
        *self.quote.read().await
    }

    pub async fn best_bid(&self) -> Option<Decimal> {
        self.quote.read().await.best_bid
    }

    pub async fn best_ask(&self) -> Option<Decimal> {
        self.quote.read().await.best_ask
    }

    pub async fn last_price(&self) -> Option<Decimal> {
        self.quote.read().await.last_price
    }
}
