// Live candle stream: connection supervision and exchange adapters
pub mod kraken_ws;
pub mod supervisor;

pub use kraken_ws::{is_supported_interval, KrakenStream, KRAKEN_INTERVALS, KRAKEN_WS_URL};
pub use supervisor::{BufferUpdate, MarketStream, StreamConfig, StreamSupervisor, SupervisorState};
