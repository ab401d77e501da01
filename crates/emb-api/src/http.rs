use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use tracing::{debug, instrument};

use emb_model::TaskKey;

use crate::{error::ApiError, handler::EmbeddingHandler};

/// Largest accepted request body.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
    body_limit: usize,
}

impl<H> HttpApi<H>
where
    H: EmbeddingHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/embedding", post(embed::<H>))
            .route("/healthz", get(healthz))
            .layer(DefaultBodyLimit::max(self.body_limit))
            .with_state(self.handler)
    }
}

/// JSON form of an embedding request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonEmbedRequest {
    /// Base64 (standard alphabet) image bytes.
    image: String,
    key: Option<String>,
    #[serde(alias = "out_path")]
    out_path: Option<String>,
}

/// Image plus the fields the key is resolved from.
#[derive(Debug, Default)]
struct EmbedInput {
    image: Vec<u8>,
    key: Option<String>,
    out_path: Option<String>,
}

impl EmbedInput {
    /// An explicit key wins over a key derived from the output path.
    fn into_parts(self) -> Result<(TaskKey, Vec<u8>), ApiError> {
        if self.image.is_empty() {
            return Err(ApiError::InvalidRequest("image is missing or empty".into()));
        }
        let key = match (non_blank(self.key), non_blank(self.out_path)) {
            (Some(key), _) => TaskKey::new(key)?,
            (None, Some(path)) => TaskKey::from_path(path)?,
            (None, None) => {
                return Err(ApiError::InvalidRequest("either key or out_path is required".into()));
            }
        };
        Ok((key, self.image))
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// POST /embedding
#[instrument(level = "debug", skip_all)]
async fn embed<H>(State(handler): State<Arc<H>>, req: Request) -> Result<Response, ApiError>
where
    H: EmbeddingHandler,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let input = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
        read_multipart(multipart).await?
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<JsonEmbedRequest>::from_request(req, &())
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
        let image = STANDARD
            .decode(body.image.trim())
            .map_err(|e| ApiError::InvalidRequest(format!("image is not valid base64: {e}")))?;
        EmbedInput {
            image,
            key: body.key,
            out_path: body.out_path,
        }
    } else {
        return Err(ApiError::InvalidRequest(
            "expected multipart/form-data or application/json".into(),
        ));
    };

    let (key, image) = input.into_parts()?;
    debug!(key = %key, bytes = image.len(), "embedding request accepted");

    let artifact = handler.embed(key, image).await?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], artifact).into_response())
}

async fn read_multipart(mut multipart: Multipart) -> Result<EmbedInput, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::InvalidRequest(e.body_text());
    let mut input = EmbedInput::default();

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => input.image = field.bytes().await.map_err(bad)?.to_vec(),
            Some("key") => input.key = Some(field.text().await.map_err(bad)?),
            Some("out_path" | "outPath") => input.out_path = Some(field.text().await.map_err(bad)?),
            _ => {}
        }
    }
    Ok(input)
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}
