//! Family-specific range loaders (§4.3): Climate daily, Air hourly, Marine
//! hourly. Each wraps a bounded per-region year cache over a monthly
//! fetch entry point.

pub mod air;
pub mod climate;
pub mod marine;
pub mod series;

pub use air::AirLoader;
pub use climate::ClimateLoader;
pub use marine::MarineLoader;
