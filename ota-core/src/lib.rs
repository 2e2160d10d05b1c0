//! OTA Core - Hardware-independent firmware update logic
//!
//! This crate contains the update manager and everything it drives:
//! version resolution, manifest normalization, preflight checks and the
//! chunked flash-writing state machine. The device talks to it through the
//! traits in [`io`], so the whole update flow can be tested on the host.

pub mod config;
pub mod error;
pub mod io;
pub mod manager;
pub mod manifest;
pub mod preflight;
pub mod report;
pub mod schedule;
pub mod version;
pub mod writer;

pub use config::{ManifestSource, OtaConfig};
pub use error::ErrorKind;
pub use io::{FlashFault, FlashTarget, FlashUpdate, HttpConnection, HttpRequest, Platform, ProgressSink, TransportError};
pub use manager::{UpdateManager, UpdateState, UpdateStatus};
pub use manifest::{ManifestClient, UpdateDescriptor};
pub use schedule::UpdateSchedule;
pub use version::VersionTriple;
pub use writer::FlashWriter;
