//! Domain types: candles, instruments, timeframes.

pub mod candle;
pub mod instrument;
pub mod timeframe;

pub use candle::{Candle, RecordError};
pub use instrument::Instrument;
pub use timeframe::{Timeframe, TimeframeError};
