pub mod classifier;
pub mod connection;
pub mod monitor;
pub mod protocol;
pub mod sim;
pub mod transport;
pub mod types;

pub use monitor::*;
pub use types::*;
