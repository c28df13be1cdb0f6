//! # Switchyard Transform
//!
//! Schema-driven field transforms.
//!
//! Schemas can annotate fields as `sensitive` (masked in request logs) or
//! with a named `transform` (coerced in place on the way in or out). The
//! [`TransformCompiler`] turns those annotations into a [`CompiledTransform`]
//! once per schema, resolving transformer names against a
//! [`TransformerRegistry`] of built-ins plus caller overrides.
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use switchyard_core::schema::{Schema, SensitiveKind};
//! use switchyard_transform::{TransformCompiler, TransformKind};
//!
//! let schema = Arc::new(Schema::object().property("email", Schema::string().sensitive(SensitiveKind::Email)));
//! let compiler = TransformCompiler::default();
//! let mask = compiler.compile(&schema, TransformKind::Mask).unwrap();
//!
//! let body = json!({ "email": "a@b.com" });
//! assert_eq!(mask.masked(&body), json!({ "email": "a****@b.com" }));
//! assert_eq!(body, json!({ "email": "a@b.com" }));
//! ```

#![doc(html_root_url = "https://docs.rs/switchyard-transform/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod compiler;
pub mod mask;
pub mod registry;

pub use compiler::{CompiledTransform, TransformCompiler, TransformError, TransformKind};
pub use mask::{mask_value, PLACEHOLDER};
pub use registry::{Transformer, TransformerRegistry};
