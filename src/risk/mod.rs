// Risk management module
pub mod sizing;

pub use sizing::{
    calculate_quantity, floor_to_step, stop_loss_price, take_profit_price, InstrumentPrecision,
    RiskConfig,
};
