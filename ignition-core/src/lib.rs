#![no_std]

// Spark ignition timing logic shared by the firmware and host tooling.
//
// Nothing in this crate touches registers directly: the control loop talks to
// the outside world through the capability traits in [`hal`], which keeps the
// same code testable on the host against the simulated bench in [`sim`].

#[macro_use]
mod fmt;

pub mod advance;
pub mod config;
pub mod controller;
pub mod freshness;
pub mod hal;
pub mod limiter;
pub mod rpm;
pub mod scheduler;
pub mod sim;
pub mod telemetry;
pub mod trigger;
