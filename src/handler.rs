//! Command handler table.
//!
//! Commands are registered by name before the service starts and the table is
//! frozen from then on; dispatch only ever reads it. Handlers are async and
//! return either a payload [`Value`] or a [`CommandError`] whose message is
//! forwarded to the host.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::CommandError;
use crate::protocol::{Request, Value};

/// Result type for command handlers.
pub type HandlerResult = std::result::Result<Value, CommandError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A registered command handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter implementing [`Handler`] for async closures.
struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(request))
    }
}

/// Mapping from command name to handler.
#[derive(Default)]
pub struct CommandTable {
    commands: HashMap<String, Box<dyn Handler>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `name`, replacing any previous registration.
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.commands
            .insert(name.to_string(), Box::new(FnHandler(handler)));
    }

    /// Look up the handler for a command name.
    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.commands.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_call() {
        let mut table = CommandTable::new();
        table.register("echo", |request: Request| async move {
            Ok(Value::String(request.args.join(" ")))
        });

        let handler = table.get("echo").unwrap();
        let result = handler
            .call(Request::new("echo", vec!["a".to_string(), "b".to_string()]))
            .await
            .unwrap();
        assert_eq!(result, Value::String("a b".to_string()));
    }

    #[tokio::test]
    async fn test_handler_error_carries_message() {
        let mut table = CommandTable::new();
        table.register("fail", |_request: Request| async move {
            Err(CommandError::new("it broke"))
        });

        let err = table
            .get("fail")
            .unwrap()
            .call(Request::new("fail", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "it broke");
    }

    #[test]
    fn test_unknown_command() {
        let table = CommandTable::new();
        assert!(table.get("frobnicate").is_none());
        assert!(!table.contains("frobnicate"));
    }
}
