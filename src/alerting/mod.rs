//! Alert evaluation and push-delivery reconciliation engine.
//!
//! Module layout, leaves first:
//! - `thresholds` – pure evaluation of a reading against potability bounds
//! - `destinations` – fan-out from a device to its alert recipients
//! - `gateway` – push gateway contract and the Expo HTTP client
//! - `directory` – user/device lookups and the token store
//! - `dispatch` – per-destination message submission
//! - `reconcile` – deferred delivery-receipt checks
//! - `service` – the orchestration facade the routes call into

mod destinations;
mod directory;
mod dispatch;
mod gateway;
mod reconcile;
mod service;
mod thresholds;

#[cfg(test)]
mod testutil;

pub use directory::{PgDirectory, UserDirectory};
pub use gateway::{ExpoPushGateway, PushGateway};
pub use service::AlertService;
