//! # Switchyard Router
//!
//! Turns controller declarations into compiled route pipelines and runs
//! them, either for a transport or in-process as child routes.
//!
//! - [`descriptor`]: routes, controllers and handler argument binding
//! - [`router`]: the route compiler ([`Router::register`])
//! - [`chain`]: the compiled per-route pipeline ([`CompiledRoute`])
//! - [`transport`]: the [`Transport`] seam and the in-process [`MemoryTransport`]
//! - [`child`]: the [`ChildDispatcher`]
//! - [`path`]: the path template index shared by transports and child routes
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use switchyard_config::RouterConfig;
//! use switchyard_router::{handler_fn, Binding, MemoryTransport, MockRequest, RouteDescriptor, Router, RouterController};
//!
//! # tokio_test::block_on(async {
//! let items = RouterController::new("/items").route(
//!     RouteDescriptor::get("/:id", handler_fn(|args| async move {
//!         let params: serde_json::Value = args.json(0)?;
//!         Ok(json!({ "id": params["id"] }))
//!     }))
//!     .bind(Binding::Params),
//! );
//!
//! let transport = MemoryTransport::new();
//! let router = Router::new(RouterConfig::default().with_route_prefix("/api"));
//! router.register(vec![items.into()], &transport).await.unwrap();
//!
//! let response = transport.inject(MockRequest::get("/api/items/7")).await.unwrap();
//! assert_eq!(response.body, Some(json!({ "id": "7" })));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/switchyard-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod child;
pub mod descriptor;
pub mod error;
pub mod error_handler;
pub mod path;
pub mod render;
pub mod router;
pub mod transport;
mod validation;

pub use chain::{CompiledRoute, DispatchMode};
pub use child::{ChildDispatcher, ChildRouteHeaders, CHILD_ROUTE_SERVICE};
pub use descriptor::{
    handler_fn, Binding, ControllerDescriptor, HandlerArg, HandlerArgs, HeaderSource, RouteDescriptor,
    RouteHandler, RouterController,
};
pub use error::RouterError;
pub use error_handler::{DefaultErrorHandler, ErrorHandler};
pub use path::{PathError, PathIndex};
pub use render::Renderer;
pub use router::{default_response_schemas, Router, RouterOptions, ERROR_BODY_SCHEMA_ID};
pub use transport::{
    ContentParser, JsonBodyParser, MemoryTransport, MockRequest, MockResponse, ParsedBody, RawBodyParser,
    RouteRegistration, Transport, REQUEST_ID_HEADER,
};
