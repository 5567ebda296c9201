//! Location subsystem: geocoding, IP geolocation, and region lookup.

pub mod callbacks;
pub mod geocoder;
pub mod region;
pub mod resolver;
pub mod types;

pub use callbacks::{CallbackRegistry, PendingCallback};
pub use geocoder::GeoCoder;
pub use region::RegionLookup;
pub use resolver::LocationResolver;
pub use types::{Coordinate, Identifier, Location, LocationSource, Region};
