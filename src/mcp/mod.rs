pub mod client;
pub mod content;
pub mod error;
pub mod transport;
