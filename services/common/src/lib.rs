//! Common types shared across the confluence engine services
//!
//! Single home for the market data model, component score model, error
//! taxonomy, configuration tree and engine-wide constants.

pub mod config;
pub mod constants;
pub mod errors;
pub mod telemetry;
pub mod types;

pub use config::{
    BreakerConfig, EngineConfig, MarketDataConfig, MonitorConfig, ResourceConfig,
    ResultCacheConfig, RetryConfig, ScoringConfig,
};
pub use errors::{DataQualityError, GatewayError, ResourceError};
pub use types::market::{
    BookLevel, MarketSnapshot, OhlcvBar, OhlcvSeries, OpenInterest, OpenInterestPoint, OrderBook,
    PublicTrade, Ticker, Timeframe,
};
pub use types::score::{Component, ComponentScore, ConfluenceResult, SentimentLabel};
