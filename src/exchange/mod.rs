pub mod paper;
mod traits;

pub use paper::PaperExchange;
pub use traits::{Account, ExchangeClient, MarketAmount};
