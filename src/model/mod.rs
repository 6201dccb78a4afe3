pub mod device_address;
pub mod entities;
pub mod geo;
pub mod kinds;
pub mod validation;

pub use device_address::DeviceAddress;
pub use entities::{EntityRecord, GroundObject, Pilot, Station, Thermal, TrackPoint};
pub use geo::GeoPoint;
pub use kinds::{AircraftKind, GroundKind, Visibility};
pub use validation::{ValidationOutcome, ValidationState};
