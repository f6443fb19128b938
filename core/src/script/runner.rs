//! Stateless evaluation of Rhai snippets against a bound host

use std::sync::Arc;

use rhai::{Dynamic, Engine, Scope};

use super::{ScriptHost, ScriptLimits};
use crate::error::ScriptError;
use crate::reply;

/// Evaluates snippets with the members of `H` callable by name.
///
/// Every evaluation builds a fresh engine and scope, so nothing leaks
/// between calls except what the host itself remembers.
pub struct ScriptRunner<H: ScriptHost> {
    host: Arc<H>,
    limits: ScriptLimits,
}

impl<H: ScriptHost> Clone for ScriptRunner<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            limits: self.limits,
        }
    }
}

impl<H: ScriptHost> ScriptRunner<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            limits: ScriptLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Compile without running. Host members are registered so calls to
    /// them resolve the same way they would during evaluation.
    pub fn check(&self, code: &str) -> Result<(), ScriptError> {
        let engine = self.build_engine()?;
        engine
            .compile(code)
            .map(|_| ())
            .map_err(|err| ScriptError::Compile {
                message: err.to_string(),
            })
    }

    /// Evaluate `code` and render the resulting value as text.
    pub fn evaluate(&self, code: &str) -> Result<String, ScriptError> {
        let engine = self.build_engine()?;
        let ast = engine.compile(code).map_err(|err| ScriptError::Compile {
            message: err.to_string(),
        })?;

        let mut scope = Scope::new();
        let value = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|err| ScriptError::Runtime {
                message: err.to_string(),
            })?;

        Ok(render(value))
    }

    /// Evaluate and flatten failures into marker text.
    ///
    /// Hosts that perform async work need a multi-thread runtime when this
    /// is called from async code; [`ScriptRunner::run_script_async`] works
    /// on either flavor.
    pub fn run_script(&self, code: &str) -> String {
        tracing::debug!(bytes = code.len(), "Evaluating script");
        match self.evaluate(code) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "Script evaluation failed");
                reply::error_text(err)
            }
        }
    }

    /// Evaluate on the blocking pool so host members can block on the
    /// runtime handle while the caller stays async.
    pub async fn run_script_async(&self, code: impl Into<String>) -> String {
        let code = code.into();
        self.on_blocking_pool(move |runner| runner.run_script(&code))
            .await
    }

    /// `OK` when `code` compiles, marker text otherwise.
    pub fn check_script(&self, code: &str) -> String {
        match self.check(code) {
            Ok(()) => "OK".to_string(),
            Err(err) => {
                tracing::debug!(error = %err, "Script check failed");
                reply::error_text(err)
            }
        }
    }

    pub async fn check_script_async(&self, code: impl Into<String>) -> String {
        let code = code.into();
        self.on_blocking_pool(move |runner| runner.check_script(&code))
            .await
    }

    async fn on_blocking_pool<F>(&self, f: F) -> String
    where
        F: FnOnce(ScriptRunner<H>) -> String + Send + 'static,
    {
        let runner = self.clone();
        match tokio::task::spawn_blocking(move || f(runner)).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "Script task aborted");
                reply::error_text(ScriptError::Runtime {
                    message: format!("evaluation aborted: {}", err),
                })
            }
        }
    }

    fn build_engine(&self) -> Result<Engine, ScriptError> {
        let mut engine = Engine::new();
        self.limits.apply(&mut engine);

        // stdout may be a protocol transport
        engine.on_print(|text| tracing::info!(target: "eventdesk::script", "{}", text));
        engine.on_debug(|text, source, position| {
            tracing::debug!(
                target: "eventdesk::script",
                source = source.unwrap_or("<script>"),
                %position,
                "{}",
                text
            )
        });

        Arc::clone(&self.host).register(&mut engine)?;
        Ok(engine)
    }
}

/// Text form of a script value.
fn render(value: Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if value.is_string() {
        return value.into_string().unwrap_or_default();
    }
    if value.is_array() || value.is_map() {
        if let Ok(json) = rhai::serde::from_dynamic::<serde_json::Value>(&value) {
            return json.to_string();
        }
    }
    value.to_string()
}
