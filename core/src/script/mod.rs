//! Script evaluator
//!
//! Runs model-generated Rhai snippets against a bound host object. The
//! host's members are registered as plain functions, so a snippet such as
//! `create_speaker("Ada", "Lovelace")` calls straight into the host.
//!
//! Rhai itself has no filesystem, network or process access. Whatever a
//! snippet can reach is exactly what the host registers, and
//! [`ScriptLimits`] bound the work a single evaluation may do.

mod limits;
mod runner;

use std::sync::Arc;

use rhai::Engine;

pub use crate::error::ScriptError;
pub use limits::ScriptLimits;
pub use runner::ScriptRunner;

/// An object whose members are callable from scripts.
pub trait ScriptHost: Send + Sync + 'static {
    /// Register the members on a freshly built engine.
    fn register(self: Arc<Self>, engine: &mut Engine) -> Result<(), ScriptError>;
}

/// A host with no members, for pure expressions.
impl ScriptHost for () {
    fn register(self: Arc<Self>, _engine: &mut Engine) -> Result<(), ScriptError> {
        Ok(())
    }
}
