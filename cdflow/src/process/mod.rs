//! External process capability.
//!
//! Stages never touch `std::process` directly. They describe an
//! [`Invocation`] and hand it to a [`CommandRunner`], which is what lets the
//! orchestration be exercised without any of the real tools installed.

mod locate;
mod redact;
mod runner;

pub use locate::{PathLocator, ToolLocator};
#[cfg(test)]
pub use locate::MockToolLocator;
pub use redact::{shell_quote, Redactor, MASK};
pub use runner::{CommandOutput, CommandRunner, Invocation, ShellCommandRunner};
