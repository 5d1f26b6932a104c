//! Exchange gateway contract
//!
//! The exchange side (REST/WebSocket framing, symbol quirks, auth) lives
//! outside this workspace; the engine only depends on this async fetch
//! contract. Every operation returns typed data or a typed
//! [`GatewayError`] — implementations must not panic on upstream garbage.

use async_trait::async_trait;
use services_common::{GatewayError, OhlcvBar, OrderBook, PublicTrade, Ticker, Timeframe};

/// Async fetch operations exposed by an exchange connector
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Fetch the ticker summary for a symbol
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, GatewayError>;

    /// Fetch up to `limit` OHLCV bars for a symbol/timeframe, oldest first
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<OhlcvBar>, GatewayError>;

    /// Fetch up to `limit` recent public trades
    async fn fetch_trades(&self, symbol: &str, limit: usize)
    -> Result<Vec<PublicTrade>, GatewayError>;

    /// Fetch an L2 orderbook snapshot with `depth` levels per side
    async fn fetch_orderbook(&self, symbol: &str, depth: usize)
    -> Result<OrderBook, GatewayError>;

    /// Fetch the current open-interest reading
    async fn fetch_open_interest(&self, symbol: &str) -> Result<f64, GatewayError>;
}
