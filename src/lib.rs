//! Persistence core for the fleet manager console.
//!
//! [`store::RecordStore`] owns `fleet.json` and its backups;
//! [`registry::InstanceRegistry`] is the CRUD surface the dashboard API calls.

pub mod config;
pub mod error;
pub mod id;
pub mod logging;
pub mod model;
pub mod registry;
pub mod store;
pub mod time;

pub use config::FleetConfig;
pub use error::{AppError, AppResult};
pub use logging::init_logging;
pub use model::{
    FleetDocument, InstancePatch, InstanceRecord, InstanceStatus, TailscaleInfo, Timestamp,
    FLEET_SCHEMA_VERSION,
};
pub use registry::InstanceRegistry;
pub use store::RecordStore;
