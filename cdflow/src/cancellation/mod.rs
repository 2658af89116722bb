//! Operator-driven cancellation.
//!
//! A run has no cancellation points of its own besides the gate timeout. The
//! token lets the binary turn an interrupt into an aborted run.

mod token;

pub use token::CancellationToken;
