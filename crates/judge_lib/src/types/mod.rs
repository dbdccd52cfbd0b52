pub mod price_update;
pub mod round;

pub use price_update::*;
pub use round::*;
