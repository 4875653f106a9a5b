//! Axum routes for one [`ResourceController`].
//!
//! | Method               | Path     | Operation |
//! |----------------------|----------|-----------|
//! | `GET`                | `/`      | index     |
//! | `POST`               | `/`      | store     |
//! | `GET`                | `/{key}` | show      |
//! | `POST`/`PUT`/`PATCH` | `/{key}` | update    |
//! | `DELETE`             | `/{key}` | destroy   |
//!
//! `{key}` is a primary key or, failing that, a uuid. A [`CancellationToken`] placed in the
//! request extensions by an outer layer cancels the list query.

use axum::{
    Json, Router,
    body::{self, Body},
    extract::{OriginalUri, Path, Request, State},
    http::{StatusCode, request::Parts},
    routing::get,
};
use sea_orm::DatabaseConnection;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::ApiError;
use crate::filtering::{PagedResult, RequestContext};
use crate::models::ListParams;
use crate::operations::ResourceController;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

struct ResourceState<C> {
    controller: Arc<C>,
    db: DatabaseConnection,
}

impl<C> Clone for ResourceState<C> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            db: self.db.clone(),
        }
    }
}

/// Build the router for `controller`. Nest it wherever the resource lives:
///
/// ```rust,ignore
/// let app = Router::new().nest("/api/parts", resource_router(PartController::new(), db));
/// ```
pub fn resource_router<C: ResourceController>(controller: C, db: DatabaseConnection) -> Router {
    let state = ResourceState {
        controller: Arc::new(controller),
        db,
    };
    Router::new()
        .route("/", get(index::<C>).post(store::<C>))
        .route(
            "/{key}",
            get(show::<C>)
                .post(update::<C>)
                .put(update::<C>)
                .patch(update::<C>)
                .delete(destroy::<C>),
        )
        .with_state(state)
}

/// Request context from the outermost URI (so page links survive nesting) and the extensions.
fn request_context(parts: &Parts) -> RequestContext {
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map_or(&parts.uri, |original| &original.0);

    let mut ctx = RequestContext::new(uri.path())
        .with_query(uri.query().unwrap_or_default())
        .with_extensions(parts.extensions.clone());
    if let Some(token) = parts.extensions.get::<CancellationToken>() {
        ctx = ctx.with_cancellation(token.clone());
    }
    ctx
}

async fn json_body(body: Body) -> Result<Value, ApiError> {
    let bytes = body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::bad_request(format!("Unable to read request body: {e}")))?;
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "Malformed JSON body");
        ApiError::bad_request("The request body is not valid JSON")
    })
}

async fn index<C: ResourceController>(
    State(state): State<ResourceState<C>>,
    request: Request,
) -> Result<Json<PagedResult<Value>>, ApiError> {
    let (parts, _) = request.into_parts();
    let ctx = request_context(&parts);
    let params = ListParams::from_query(parts.uri.query().unwrap_or_default())?;
    let page = state.controller.index(&state.db, &params, &ctx).await?;
    Ok(Json(page))
}

async fn show<C: ResourceController>(
    State(state): State<ResourceState<C>>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.controller.show(&state.db, &key).await?))
}

async fn store<C: ResourceController>(
    State(state): State<ResourceState<C>>,
    request: Request,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (parts, body) = request.into_parts();
    let ctx = request_context(&parts);
    let payload = json_body(body).await?;
    let created = state.controller.store(&state.db, payload, &ctx).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<C: ResourceController>(
    State(state): State<ResourceState<C>>,
    Path(key): Path<String>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let (parts, body) = request.into_parts();
    let ctx = request_context(&parts);
    let payload = json_body(body).await?;
    let updated = state.controller.update(&state.db, &key, payload, &ctx).await?;
    Ok(Json(updated))
}

async fn destroy<C: ResourceController>(
    State(state): State<ResourceState<C>>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.controller.destroy(&state.db, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
