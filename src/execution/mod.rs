// Candle storage, position lifecycle and the order execution boundary
pub mod candle_buffer;
pub mod executor;
pub mod paper;
pub mod position_manager;

pub use candle_buffer::{CandleBuffer, IgnoreReason, IngestOutcome};
pub use executor::{
    AccountProvider, IntentKind, OrderConfirmation, OrderExecutor, OrderIntent, OrderRequest,
};
pub use paper::{PaperBroker, PaperLedger};
pub use position_manager::{ExitReason, Position, PositionManager, PositionState};
