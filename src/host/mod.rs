//! Tool hosting: normalization, registry, dispatch and the built-in tools.

pub mod aliases;
pub mod dispatcher;
pub mod handlers;
pub mod registry;
pub mod state;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use state::HostState;
