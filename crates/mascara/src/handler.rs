//! Handler table: user-supplied method implementations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::stream::RpcValue;

/// Error a handler completes with. Only its message travels back to the
/// caller in the error response.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The message that will reach the caller.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Outcome of one handler invocation: the positional result slots, any of
/// which may be a live stream endpoint, or an error.
pub type HandlerResult = Result<Vec<RpcValue>, HandlerError>;

/// A method implementation bound to a name in the [`HandlerTable`].
///
/// Blanket-implemented for async closures, so most handlers register
/// directly:
///
/// ```rust
/// use mascara::{HandlerTable, RpcValue};
/// use serde_json::Value;
///
/// let mut handlers = HandlerTable::new();
/// handlers.register("echo", |params: Vec<Value>| async move {
///     Ok(params.into_iter().map(RpcValue::Value).collect())
/// });
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Invoked with the request's positional params. Completes exactly
    /// once; the outcome becomes the response.
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(params))
    }
}

/// Mapping from method name to handler.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to a method name, replacing any previous binding.
    pub fn register(
        &mut self,
        method: impl Into<String>,
        handler: impl Handler,
    ) -> &mut Self {
        self.handlers.insert(method.into(), Arc::new(handler));
        self
    }

    /// Looks up the handler for a method.
    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(method).cloned()
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table has no methods.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_handler_registers_and_calls() {
        let mut table = HandlerTable::new();
        table.register("double", |params: Vec<Value>| async move {
            let n = params[0].as_i64().ok_or("expected a number")?;
            Ok(vec![RpcValue::Value(json!(n * 2))])
        });

        let handler = table.get("double").expect("registered");
        let result = handler.call(vec![json!(21)]).await.unwrap();
        assert_eq!(result[0].as_value(), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_handler_error_message_preserved() {
        let mut table = HandlerTable::new();
        table.register("fail", |_params: Vec<Value>| async move {
            Err(HandlerError::new("boom"))
        });

        let err = table.get("fail").unwrap().call(vec![]).await.unwrap_err();
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_missing_method_lookup() {
        let table = HandlerTable::new();
        assert!(table.get("nope").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_register_replaces_previous_binding() {
        let mut table = HandlerTable::new();
        table.register("m", |_p: Vec<Value>| async move { Ok(vec![]) });
        table.register("m", |_p: Vec<Value>| async move {
            Ok(vec![RpcValue::Value(json!("second"))])
        });
        assert_eq!(table.len(), 1);
    }
}
