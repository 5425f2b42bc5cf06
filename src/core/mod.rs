pub mod clock;
pub mod error;
pub mod value;

pub use clock::{Clock, SystemClock};
pub use error::{BatchError, Phase, Result};
pub use value::Value;
