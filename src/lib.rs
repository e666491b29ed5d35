pub mod config;
pub mod engine;
pub mod error;
pub mod prober;
pub mod recipe;
pub mod sdp;
pub mod session;
pub mod sink;
pub mod streamer;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
