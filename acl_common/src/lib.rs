mod money;
pub mod op;
mod rate;

pub use money::{Money, MoneyConversionError};
pub use rate::{CommissionRate, RateConversionError};
