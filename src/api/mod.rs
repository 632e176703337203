//! REST/stream surface (spec §6): the minimal subset of endpoints an
//! external caller needs to create and observe jobs. Everything here is a
//! thin translation layer over the Job Manager and Progress Bus; no
//! business logic lives in a handler.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
