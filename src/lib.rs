//! achgate - ACH file transfer controller
//!
//! The file-moving side of a payments gateway: merges pending transfers and
//! micro-deposits into ACH files, uploads them to ODFIs near their cutoff
//! times, polls for inbound and return files, and applies return codes back
//! onto transfer and depository records.
//!
//! # Modules
//!
//! - [`ach`] - Nacha fixed-width file codec
//! - [`store`] - working-directory conventions (filenames, sequences, scans)
//! - [`agent`] - FTP/SFTP/local file transfer capability
//! - [`repository`] - per-ODFI cutoff, path, and credential lookup
//! - [`achclient`] - upstream ACH service client
//! - [`depository`] / [`transfers`] - persisted entities and their repos
//! - [`controller`] - the periodic merge/upload/return cycle
//! - [`config`] / [`logging`] / [`metrics`] - process plumbing

pub mod ach;
pub mod achclient;
pub mod agent;
pub mod config;
pub mod controller;
pub mod depository;
pub mod logging;
pub mod metrics;
pub mod money;
pub mod repository;
pub mod store;
pub mod transfers;

// Convenient re-exports at crate root
pub use achclient::{AchFileSource, AchServiceClient};
pub use config::AppConfig;
pub use controller::{Controller, ControllerConfig, ControllerError};
pub use money::Amount;
