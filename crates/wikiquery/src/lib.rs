//! wikiquery — typed queries over MediaWiki-style APIs.
//!
//! Filter, order and select clauses are written as [`Expr`] trees,
//! compiled into wire parameters by the [`ExpressionCompiler`], and sent by
//! a [`Downloader`] that speaks the API's POST/XML protocol.

pub mod compiler;
pub mod config;
pub mod download;
pub mod expr;
pub mod params;
pub mod query;
pub mod request;
pub mod response;
pub mod types;

pub use compiler::{wire_name, ExpressionCompiler, FLAG_MARKER};
pub use config::{DownloaderConfig, WikiInfo};
pub use download::Downloader;
pub use expr::{Expr, Function};
pub use params::{Projector, QueryParameters, Row};
pub use query::{build_request, OrderSpec, QueryResult, QuerySpec, WikiQuery};
pub use request::{FilePayload, HttpQueryParameter};
pub use response::{XmlDocument, XmlElement};
pub use types::*;
