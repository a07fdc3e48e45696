pub mod audit;
pub mod book;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod logging;

pub use audit::{AuditSink, TracingAudit};
pub use book::{BookHandle, Quote};
pub use config::AppConfig;
pub use domain::{
    round_coin, round_fiat, Fill, Order, OrderSide, OrderStatus, Product, ProductInfo,
};
pub use engine::{
    BalanceBook, DecisionEngine, OrderExecutor, OrderMonitor, TradeEngine, FILL_WINDOW,
};
pub use error::{BotError, Result};
pub use exchange::{Account, ExchangeClient, MarketAmount, PaperExchange};
pub use indicators::{break_even_price, sell_point, PeriodSnapshot};
