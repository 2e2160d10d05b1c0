//! Host-based tests for the OTA update manager
//! These run the full check/install flow on the development machine against
//! simulated network, flash and platform collaborators.

pub mod sim;
