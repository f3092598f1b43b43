//! Child process execution: one-shot commands and background sessions.

pub mod buffer;
pub mod runner;
pub mod session;
pub mod shell;

pub use runner::{CommandResult, CommandRunner};
pub use session::SessionManager;
