//! Procedure context: the names a channel exposes to remote callers.
//!
//! A remote call names a verb; the receiver looks it up here and runs it.
//! Nothing outside this mapping is reachable from another peer.

use crate::error::ProcedureError;
use openpeer_wire::CallRequest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// A remotely invocable procedure.
pub type Procedure = Arc<dyn Fn(Vec<Value>) -> Result<Value, ProcedureError> + Send + Sync>;

/// Adapt a function over typed arguments into a JSON procedure.
///
/// The argument array is decoded into `A` (use a tuple for positional
/// arguments, e.g. `(i64, i64)` or `(String,)`) and the result is encoded back.
pub fn typed<A, R, F>(f: F) -> impl Fn(Vec<Value>) -> Result<Value, ProcedureError> + Send + Sync
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> Result<R, ProcedureError> + Send + Sync,
{
    move |args: Vec<Value>| {
        let args: A = serde_json::from_value(Value::Array(args))
            .map_err(|e| ProcedureError::InvalidArguments(e.to_string()))?;
        let result = f(args)?;
        serde_json::to_value(result).map_err(ProcedureError::failed)
    }
}

/// A group of named procedures registered together.
#[derive(Default, Clone)]
pub struct Namespace {
    procedures: Vec<(String, Procedure)>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a procedure.
    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    {
        self.procedures.push((name.into(), Arc::new(f)));
        self
    }

    /// Add a procedure over typed arguments. See [`typed`].
    pub fn with_typed<A, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Result<R, ProcedureError> + Send + Sync + 'static,
    {
        self.with(name, typed(f))
    }

    /// Names in this namespace, in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.procedures.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Registered procedures, keyed by name.
#[derive(Default)]
pub struct ProcedureContext {
    procedures: RwLock<HashMap<String, Procedure>>,
}

impl ProcedureContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) one procedure.
    pub fn register<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    {
        let mut procedures = self.procedures.write().unwrap_or_else(|e| e.into_inner());
        procedures.insert(name.into(), Arc::new(f));
    }

    /// Register every procedure in a namespace.
    pub fn register_namespace(&self, namespace: Namespace) {
        let mut procedures = self.procedures.write().unwrap_or_else(|e| e.into_inner());
        for (name, procedure) in namespace.procedures {
            procedures.insert(name, procedure);
        }
    }

    /// Look a procedure up.
    pub fn get(&self, name: &str) -> Option<Procedure> {
        let procedures = self.procedures.read().unwrap_or_else(|e| e.into_inner());
        procedures.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let procedures = self.procedures.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = procedures.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the procedure a request names.
    ///
    /// The lock is released before the procedure runs, so a procedure may
    /// itself register further names. A panic inside the procedure is turned
    /// into a failure carrying the panic message.
    pub fn invoke(&self, request: CallRequest) -> Result<Value, ProcedureError> {
        let procedure = self
            .get(&request.verb)
            .ok_or_else(|| ProcedureError::NotDefined(request.verb.clone()))?;
        let args = request.args;
        match catch_unwind(AssertUnwindSafe(|| procedure(args))) {
            Ok(result) => result,
            Err(panic) => Err(ProcedureError::Failed(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "procedure panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(verb: &str, args: Vec<Value>) -> CallRequest {
        CallRequest::new(verb, args)
    }

    #[test]
    fn test_register_and_invoke() {
        let context = ProcedureContext::new();
        context.register("greet", |_| Ok(json!("hi")));
        assert_eq!(context.invoke(request("greet", vec![])), Ok(json!("hi")));
    }

    #[test]
    fn test_unknown_verb() {
        let context = ProcedureContext::new();
        let err = context.invoke(request("greet", vec![])).unwrap_err();
        assert_eq!(err.to_string(), "greet is not defined");
    }

    #[test]
    fn test_namespace_registration() {
        let context = ProcedureContext::new();
        context.register_namespace(
            Namespace::new()
                .with("one", |_| Ok(json!(1)))
                .with_typed("add", |(a, b): (i64, i64)| Ok(a + b)),
        );
        assert_eq!(context.names(), vec!["add", "one"]);
        assert_eq!(
            context.invoke(request("add", vec![json!(2), json!(3)])),
            Ok(json!(5))
        );
    }

    #[test]
    fn test_replace_procedure() {
        let context = ProcedureContext::new();
        context.register("v", |_| Ok(json!(1)));
        context.register("v", |_| Ok(json!(2)));
        assert_eq!(context.invoke(request("v", vec![])), Ok(json!(2)));
    }

    #[test]
    fn test_typed_rejects_bad_arguments() {
        let context = ProcedureContext::new();
        context.register("add", typed(|(a, b): (i64, i64)| Ok(a + b)));
        let err = context
            .invoke(request("add", vec![json!("x"), json!(1)]))
            .unwrap_err();
        assert!(matches!(err, ProcedureError::InvalidArguments(_)));
    }

    #[test]
    fn test_failure_message_preserved() {
        let context = ProcedureContext::new();
        context.register("fail", |_| Err("disk full".into()));
        let err = context.invoke(request("fail", vec![])).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_panic_becomes_failure() {
        let context = ProcedureContext::new();
        context.register("explode", |_| panic!("kaboom"));
        let err = context.invoke(request("explode", vec![])).unwrap_err();
        assert_eq!(err, ProcedureError::Failed("kaboom".to_string()));
    }
}
