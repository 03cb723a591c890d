pub mod config;
pub mod error;
pub mod progress;
pub mod quote;
pub mod shipment;
pub mod status;
pub mod tracking;
pub mod validation;

pub use config::{AppConfig, DatabaseConfig, HttpConfig, QueueMode};
pub use error::{CoreError, Result};
pub use progress::{Progress, ProgressSummary, TimelineStage};
pub use quote::{PackageDetails, Quote, QuoteRequest, ServiceOption};
pub use shipment::{next_event_time, EventMetadata, NewShipment, Party, Shipment, TrackingEvent};
pub use status::{ShipmentStatus, FORWARD_CHAIN};
pub use tracking::TrackingNumber;
pub use validation::ValidationError;
