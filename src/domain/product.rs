use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::book::BookHandle;
use crate::domain::Order;

/// Product metadata as reported by the exchange's product list.
///
/// Carrying the base/quote codes here (instead of slicing the id string)
/// keeps instruments with longer currency codes working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    /// Minimum price increment (tick size)
    pub quote_increment: Decimal,
    /// Minimum base-currency order size
    pub min_size: Decimal,
}

/// One traded instrument and its shared trading state.
///
/// Created at startup, lives for the process. Writers are disciplined by
/// construction: the decision engine sets the intent flags, the execution
/// task owns `order_in_progress` and the open-orders list while it runs,
/// and the monitor replaces the open-orders list only from authoritative
/// exchange data (or clears it when no execution task exists).
#[derive(Debug)]
pub struct Product {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub quote_increment: Decimal,
    pub min_size: Decimal,
    pub book: BookHandle,

    buy_flag: AtomicBool,
    sell_flag: AtomicBool,
    order_in_progress: AtomicBool,
    open_orders: RwLock<Vec<Order>>,
    last_signal_switch: RwLock<Option<DateTime<Utc>>>,
}

impl Product {
    pub fn new(info: ProductInfo, book: BookHandle) -> Self {
        Self {
            id: info.id,
            base_currency: info.base_currency,
            quote_currency: info.quote_currency,
            quote_increment: info.quote_increment,
            min_size: info.min_size,
            book,
            buy_flag: AtomicBool::new(false),
            sell_flag: AtomicBool::new(false),
            order_in_progress: AtomicBool::new(false),
            open_orders: RwLock::new(Vec::new()),
            last_signal_switch: RwLock::new(None),
        }
    }

    // --- intent flags (written by the decision engine) ---

    pub fn buy_flag(&self) -> bool {
        self.buy_flag.load(Ordering::SeqCst)
    }

    pub fn sell_flag(&self) -> bool {
        self.sell_flag.load(Ordering::SeqCst)
    }

    pub fn set_buy_flag(&self, value: bool) {
        self.buy_flag.store(value, Ordering::SeqCst);
    }

    pub fn set_sell_flag(&self, value: bool) {
        self.sell_flag.store(value, Ordering::SeqCst);
    }

    // --- execution ownership ---

    pub fn order_in_progress(&self) -> bool {
        self.order_in_progress.load(Ordering::SeqCst)
    }

    /// Claim the instrument for an execution task. Returns false if another
    /// task already owns it.
    pub fn begin_execution(&self) -> bool {
        !self.order_in_progress.swap(true, Ordering::SeqCst)
    }

    pub fn end_execution(&self) {
        self.order_in_progress.store(false, Ordering::SeqCst);
    }

    // --- open orders ---

    pub async fn open_orders(&self) -> Vec<Order> {
        self.open_orders.read().await.clone()
    }

    pub async fn open_order_count(&self) -> usize {
        self.open_orders.read().await.len()
    }

    pub async fn set_open_orders(&self, orders: Vec<Order>) {
        *self.open_orders.write().await = orders;
    }

    pub async fn clear_open_orders(&self) {
        self.open_orders.write().await.clear();
    }

    pub async fn push_open_order(&self, order: Order) {
        self.open_orders.write().await.push(order);
    }

    // --- signal bookkeeping ---

    pub async fn mark_signal_switch(&self) {
        *self.last_signal_switch.write().await = Some(Utc::now());
    }

    pub async fn last_signal_switch(&self) -> Option<DateTime<Utc>> {
        *self.last_signal_switch.read().await
    }
}
