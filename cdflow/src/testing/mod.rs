//! Testing utilities for cdflow pipelines.
//!
//! Scripted doubles for the two external capabilities a run depends on:
//! command execution and the quality gate. Neither touches the host.

mod mocks;

pub use mocks::{CommandSpan, ScriptedCommandRunner, ScriptedGate};
