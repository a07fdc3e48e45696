use clap::{Parser, Subcommand};
use coinbot::config::AppConfig;
use coinbot::domain::ProductInfo;
use coinbot::error::{BotError, Result};
use coinbot::exchange::PaperExchange;
use coinbot::indicators::PeriodSnapshot;
use coinbot::logging::{init_logging, init_logging_simple};
use coinbot::{TracingAudit, TradeEngine};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "coinbot", about = "Indicator-driven exchange execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading engine (simulate mode against the paper exchange)
    Run,
    /// Print the current balance snapshot and exit
    Balances,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command {
        Commands::Run => {
            init_logging(&config.logging);
            run_engine(config).await
        }
        Commands::Balances => {
            init_logging_simple();
            show_balances(config).await
        }
    }
}

/// Seed an in-memory exchange for the configured products. The separator
/// split here only feeds the simulation; a live adapter would report real
/// metadata through `get_products`.
fn paper_exchange(config: &AppConfig) -> Result<Arc<PaperExchange>> {
    let mut infos = Vec::new();
    for id in &config.engine.products {
        let (base, quote) = id
            .split_once('-')
            .ok_or_else(|| BotError::Validation(format!("product id without separator: {id}")))?;
        infos.push(ProductInfo {
            id: id.clone(),
            base_currency: base.to_string(),
            quote_currency: quote.to_string(),
            quote_increment: dec!(0.01),
            min_size: dec!(0.001),
        });
    }
    Ok(Arc::new(PaperExchange::new(infos)))
}

async fn build_engine(config: &AppConfig) -> Result<(TradeEngine, Arc<PaperExchange>)> {
    if config.engine.live {
        return Err(BotError::Validation(
            "no live exchange adapter is configured; unset engine.live".to_string(),
        ));
    }
    let exchange = paper_exchange(config)?;
    exchange
        .set_balance(&config.engine.fiat_currency, dec!(10000))
        .await;

    let engine = TradeEngine::new(
        exchange.clone(),
        Arc::new(TracingAudit),
        &config.engine,
        &config.execution,
    )
    .await?;
    Ok((engine, exchange))
}

async fn run_engine(config: AppConfig) -> Result<()> {
    let (engine, _exchange) = build_engine(&config).await?;
    engine.start().await;
    info!(products = ?config.engine.products, "engine running in simulate mode");

    // Synthetic feed: drift each book around a base price and re-evaluate.
    let mut price = dec!(30000);
    let mut step = dec!(15);
    let mut cycle = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            _ = cycle.tick() => {
                price += step;
                if price > dec!(30300) || price < dec!(29700) {
                    step = -step;
                }
                for product in engine.products() {
                    product
                        .book
                        .set_prices(price - product.quote_increment, price)
                        .await;
                    let periods = synthetic_periods(&product.id, price);
                    if let Err(e) = engine.decide(&product.id, &periods).await {
                        warn!(product_id = %product.id, "decision cycle failed: {e}");
                    }
                }
                engine.balances().log_balances().await;
            }
        }
    }

    info!("shutting down");
    engine.close(true).await;
    Ok(())
}

fn synthetic_periods(product_id: &str, price: Decimal) -> Vec<PeriodSnapshot> {
    let band = price * dec!(0.01);
    vec![PeriodSnapshot {
        period: format!("{product_id}-5m"),
        close: price,
        sma_trend: dec!(0.1),
        bband_lower_1: price - band,
        bband_upper_1: price + band,
    }]
}

async fn show_balances(config: AppConfig) -> Result<()> {
    let (engine, _exchange) = build_engine(&config).await?;
    for (currency, amount) in engine.balances().snapshot().await {
        println!("{currency}: {amount}");
    }
    println!("fiat_equivalent: {}", engine.balances().fiat_equivalent().await);
    Ok(())
}
