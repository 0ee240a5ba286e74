pub mod change;
pub mod error;
pub mod filter;
pub mod phoenix;
pub mod status;

pub use change::*;
pub use error::*;
pub use filter::*;
pub use phoenix::{PhoenixMessage, PHOENIX_TOPIC};
pub use status::*;
