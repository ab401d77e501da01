//! HTTP boundary of the embedding service.
//!
//! Routes:
//! - `POST /embedding` - multipart (`image` + `out_path`/`key`) or JSON
//!   (`{"image": "<base64>", "key"?, "outPath"?}`); replies with the raw artifact
//! - `GET /healthz` - liveness
mod error;
pub use error::ApiError;

mod handler;
pub use handler::EmbeddingHandler;

mod adapter;
pub use adapter::DispatcherAdapter;

mod http;
pub use http::{DEFAULT_BODY_LIMIT, HttpApi};
