//! Template rendering sink.

use serde_json::Value;
use switchyard_core::{BoxFuture, Reply, RouteError};

/// Renders a template into a reply.
///
/// Routes declared with a render target hand their output to the configured
/// renderer instead of sending it. The renderer is expected to send.
pub trait Renderer: Send + Sync {
    /// Renders `template` with `data`.
    fn render<'a>(
        &'a self,
        template: &'a str,
        data: Value,
        reply: &'a Reply,
    ) -> BoxFuture<'a, Result<(), RouteError>>;
}

/// Splits a `{template, data}` pair returned by a dynamic render route.
pub(crate) fn dynamic_target(output: Value) -> Result<(String, Value), RouteError> {
    match output {
        Value::Object(mut map) => {
            let template = match map.remove("template") {
                Some(Value::String(template)) => template,
                _ => {
                    return Err(RouteError::internal(
                        "dynamic render output must contain a string 'template'",
                    ))
                }
            };
            let data = map.remove("data").unwrap_or(Value::Null);
            Ok((template, data))
        }
        _ => Err(RouteError::internal(
            "dynamic render output must be an object with 'template' and 'data'",
        )),
    }
}
