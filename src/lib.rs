//! Healthfinder: resolves a partial location into nearby hospitals and the
//! healthcare plans offered in its county.

pub mod config;
pub mod cycle;
pub mod datasets;
pub mod distance;
pub mod error;
pub mod finder;
pub mod location;
pub mod logging;
pub mod server;
pub mod transport;

pub use config::Config;
pub use error::{FinderError, Result};
pub use finder::Finder;
