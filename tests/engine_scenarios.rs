//! End-to-end engine scenarios against the in-memory paper exchange.

use chrono::{Duration as ChronoDuration, Utc};
use coinbot::config::{EngineConfig, ExecutionConfig};
use coinbot::domain::{Fill, OrderSide};
use coinbot::exchange::PaperExchange;
use coinbot::indicators::PeriodSnapshot;
use coinbot::{TracingAudit, TradeEngine, FILL_WINDOW};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use coinbot::ExchangeClient;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_test::assert_ok;

fn engine_config(live: bool, market_orders: bool) -> EngineConfig {
    EngineConfig {
        products: vec!["BTC-USD".to_string()],
        fiat_currency: "USD".to_string(),
        live,
        market_orders,
        max_slippage_pct: dec!(0.10),
        fee_rate: dec!(0.005),
    }
}

fn execution_config() -> ExecutionConfig {
    ExecutionConfig {
        tick_ms: 10,
        refresh_interval_ms: 1000,
    }
}

async fn engine_with(
    config: EngineConfig,
    exchange: &Arc<PaperExchange>,
) -> TradeEngine {
    TradeEngine::new(
        exchange.clone(),
        Arc::new(TracingAudit),
        &config,
        &execution_config(),
    )
    .await
    .expect("engine construction")
}

fn bullish_period(close: Decimal) -> Vec<PeriodSnapshot> {
    vec![PeriodSnapshot {
        period: "BTC-USD-5m".to_string(),
        close,
        sma_trend: dec!(0.5),
        bband_lower_1: close - dec!(5),
        bband_upper_1: close + dec!(40),
    }]
}

fn bearish_period(close: Decimal) -> Vec<PeriodSnapshot> {
    vec![PeriodSnapshot {
        period: "BTC-USD-5m".to_string(),
        close,
        sma_trend: dec!(-0.5),
        bband_lower_1: close + dec!(5),
        bband_upper_1: close + dec!(40),
    }]
}

fn buy_fill(trade_id: &str, price: Decimal, age_secs: i64) -> Fill {
    Fill {
        trade_id: trade_id.to_string(),
        product_id: "BTC-USD".to_string(),
        side: OrderSide::Buy,
        price,
        size: dec!(0.1),
        fee: dec!(0.05),
        created_at: Utc::now() - ChronoDuration::seconds(age_secs),
    }
}

#[tokio::test]
async fn balances_are_floored_on_construction() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    exchange.set_balance("BTC", dec!(1.234567891)).await;
    exchange.set_balance("USD", dec!(1000.00)).await;

    let engine = engine_with(engine_config(false, false), &exchange).await;
    assert_eq!(engine.balances().balance("BTC").await, dec!(1.23456789));
    assert_eq!(engine.balances().balance("USD").await, dec!(1000.00));
}

#[tokio::test]
async fn unknown_product_is_a_configuration_error() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    let mut config = engine_config(false, false);
    config.products.push("DOGE-USD".to_string());

    let result = TradeEngine::new(
        exchange,
        Arc::new(TracingAudit),
        &config,
        &execution_config(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn decide_never_leaves_both_intents_set() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    exchange.set_balance("USD", dec!(1000)).await;
    exchange.set_balance("BTC", dec!(1)).await;

    let config = engine_config(true, true);
    let engine = engine_with(config, &exchange).await;
    let product = engine.product("BTC-USD").expect("configured product").clone();
    product.book.set_prices(dec!(99.99), dec!(100.00)).await;

    for periods in [
        bullish_period(dec!(100)),
        bearish_period(dec!(100)),
        Vec::new(),
    ] {
        tokio_test::assert_ok!(engine.decide("BTC-USD", &periods).await);
        assert!(
            !(product.buy_flag() && product.sell_flag()),
            "buy and sell intent must be mutually exclusive"
        );
    }
}

#[tokio::test]
async fn buy_consensus_places_an_immediate_market_order() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    exchange.set_balance("USD", dec!(1000)).await;

    let engine = engine_with(engine_config(true, true), &exchange).await;
    let product = engine.product("BTC-USD").expect("configured product").clone();
    product.book.set_prices(dec!(99.99), dec!(100.00)).await;

    tokio_test::assert_ok!(engine.decide("BTC-USD", &bullish_period(dec!(100))).await);

    assert!(product.buy_flag());
    assert!(!product.sell_flag());
    assert!(product.last_signal_switch().await.is_some());

    let markets = exchange.market_orders().await;
    assert_eq!(markets.len(), 1);
    assert_eq!(markets[0].side, OrderSide::Buy);
}

#[tokio::test]
async fn simulate_mode_never_touches_the_exchange() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    exchange.set_balance("USD", dec!(1000)).await;

    let engine = engine_with(engine_config(false, true), &exchange).await;
    let product = engine.product("BTC-USD").expect("configured product").clone();
    product.book.set_prices(dec!(99.99), dec!(100.00)).await;

    tokio_test::assert_ok!(engine.decide("BTC-USD", &bullish_period(dec!(100))).await);

    assert!(!product.buy_flag());
    assert!(exchange.market_orders().await.is_empty());
}

#[tokio::test]
async fn buy_intent_launches_a_single_execution_task() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    exchange.set_balance("USD", dec!(1000)).await;

    let engine = engine_with(engine_config(true, false), &exchange).await;
    let product = engine.product("BTC-USD").expect("configured product").clone();
    product.book.set_prices(dec!(99.99), dec!(100.00)).await;

    tokio_test::assert_ok!(engine.decide("BTC-USD", &bullish_period(dec!(100))).await);

    // Give the spawned execution task a few ticks to claim and place.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(product.order_in_progress());
    assert_eq!(exchange.resting_order_count().await, 1);

    // A second decision cycle with the same consensus must not stack a
    // second execution task on the claimed instrument.
    tokio_test::assert_ok!(engine.decide("BTC-USD", &bullish_period(dec!(100))).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(exchange.resting_order_count().await, 1);

    // Closing clears the intent; the task cancels its orders and releases.
    engine.close(false).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!product.order_in_progress());
    assert_eq!(product.open_order_count().await, 0);
    assert_eq!(exchange.resting_order_count().await, 0);
}

#[tokio::test]
async fn emergency_sell_launches_the_sell_side() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    exchange.set_balance("USD", dec!(10)).await;
    exchange.set_balance("BTC", dec!(1)).await;
    // Bought at 110; the market is now below both the band and that price.
    exchange.push_fill(buy_fill("t1", dec!(110), 5)).await;

    let engine = engine_with(engine_config(true, false), &exchange).await;
    let product = engine.product("BTC-USD").expect("configured product").clone();
    product.book.set_prices(dec!(99.99), dec!(100.00)).await;

    engine.start().await;
    // Let the monitor pull the staged fill into the recent-fills window.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.recent_fills().await.len(), 1);

    tokio_test::assert_ok!(engine.decide("BTC-USD", &bearish_period(dec!(100))).await);

    assert!(product.sell_flag());
    assert!(!product.buy_flag());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(product.order_in_progress());
    let open = product.open_orders().await;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].side, OrderSide::Sell);

    engine.close(true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!product.order_in_progress());
}

#[tokio::test]
async fn recent_fills_window_is_bounded_and_ordered() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    for i in 0..8 {
        exchange
            .push_fill(buy_fill(&format!("t{i}"), dec!(100), 80 - i))
            .await;
    }

    let engine = engine_with(engine_config(false, false), &exchange).await;
    engine.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fills = engine.recent_fills().await;
    assert!(fills.len() <= FILL_WINDOW);
    assert_eq!(fills.len(), FILL_WINDOW);
    for pair in fills.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }

    engine.close(true).await;
}

#[tokio::test]
async fn close_sweeps_orders_exchange_wide() {
    let exchange = Arc::new(PaperExchange::new(vec![PaperExchange::btc_usd_info()]));
    exchange
        .place_limit_order("BTC-USD", OrderSide::Buy, dec!(0.01), dec!(90), true)
        .await
        .expect("stage order");

    let engine = engine_with(engine_config(false, false), &exchange).await;
    engine.close(false).await;
    assert_eq!(exchange.resting_order_count().await, 0);
}
