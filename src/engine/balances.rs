//! Balance and valuation tracking.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::audit::AuditSink;
use crate::domain::{round_coin, round_fiat, Fill, Product};
use crate::exchange::ExchangeClient;

/// Owns the balance snapshot and its fiat-equivalent valuation.
///
/// The snapshot is replaced wholesale on every successful refresh; a failed
/// refresh leaves the previous snapshot intact, so readers always see a
/// consistent (possibly stale) view.
pub struct BalanceBook {
    client: Arc<dyn ExchangeClient>,
    audit: Arc<dyn AuditSink>,
    fiat_currency: String,
    refresh_interval: Duration,
    products: Vec<Arc<Product>>,
    recent_fills: Arc<RwLock<Vec<Fill>>>,
    balances: RwLock<HashMap<String, Decimal>>,
    fiat_equivalent: RwLock<Decimal>,
    last_refresh: Mutex<Option<Instant>>,
}

impl BalanceBook {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        audit: Arc<dyn AuditSink>,
        fiat_currency: String,
        refresh_interval: Duration,
        products: Vec<Arc<Product>>,
        recent_fills: Arc<RwLock<Vec<Fill>>>,
    ) -> Self {
        Self {
            client,
            audit,
            fiat_currency,
            refresh_interval,
            products,
            recent_fills,
            balances: RwLock::new(HashMap::new()),
            fiat_equivalent: RwLock::new(Decimal::ZERO),
            last_refresh: Mutex::new(None),
        }
    }

    /// Re-read account balances from the exchange.
    ///
    /// No-op within `refresh_interval` of the previous attempt, successful
    /// or not; a down exchange is polled at the refresh cadence, never the
    /// caller's. On any exchange error the snapshot is left untouched and
    /// the next window retries.
    pub async fn refresh(&self) {
        let mut last_refresh = self.last_refresh.lock().await;
        if let Some(last) = *last_refresh {
            if last.elapsed() < self.refresh_interval {
                return;
            }
        }
        *last_refresh = Some(Instant::now());

        let accounts = match self.client.get_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("balance refresh failed, keeping stale snapshot: {e}");
                return;
            }
        };
        drop(last_refresh);

        let mut next = HashMap::with_capacity(accounts.len());
        for account in accounts {
            let amount = if account.currency == self.fiat_currency {
                round_fiat(account.available)
            } else {
                round_coin(account.available)
            };
            next.insert(account.currency, amount);
        }
        *self.balances.write().await = next;

        self.recompute_fiat_equivalent().await;

        let fills = self.recent_fills.read().await.clone();
        self.audit.log_fills(&fills).await;
    }

    /// Fiat balance plus the projected fiat cost of every held coin with a
    /// known book price. Prices may lag the balance snapshot by design.
    async fn recompute_fiat_equivalent(&self) {
        let mut total = self.balance(&self.fiat_currency).await;
        for product in &self.products {
            let quote = product.book.snapshot().await;
            let price = quote.last_price.or(quote.best_bid);
            if let Some(price) = price {
                total += self.balance(&product.base_currency).await * price;
            }
        }
        *self.fiat_equivalent.write().await = total;
    }

    pub async fn balance(&self, currency: &str) -> Decimal {
        self.balances
            .read()
            .await
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn fiat_equivalent(&self) -> Decimal {
        *self.fiat_equivalent.read().await
    }

    pub async fn snapshot(&self) -> HashMap<String, Decimal> {
        self.balances.read().await.clone()
    }

    /// Available quote-currency funds for a product, refreshed first.
    pub async fn quoted_funds(&self, product: &Product) -> Decimal {
        self.refresh().await;
        self.balance(&product.quote_currency).await
    }

    /// Available base-currency inventory for a product, refreshed first.
    pub async fn base_funds(&self, product: &Product) -> Decimal {
        self.refresh().await;
        self.balance(&product.base_currency).await
    }

    pub async fn log_balances(&self) {
        let fiat = self.balance(&self.fiat_currency).await;
        let equivalent = self.fiat_equivalent().await;
        let mut held = Vec::new();
        for product in &self.products {
            let amount = self.balance(&product.base_currency).await;
            held.push(format!("{}={}", product.base_currency, amount));
        }
        debug!(
            "[BALANCES] {}={} fiat_equivalent={} {}",
            self.fiat_currency,
            fiat,
            equivalent,
            held.join(" ")
        );
    }
}
