//! # Errors
//!
//! Every operation in this crate returns [`ApiError`]. An error carries its HTTP status, the message
//! a client may see, and, for server-side failures, a cause that is only ever logged.
//!
//! Failures inside the list pipeline (unknown column, value of the wrong type, a store error while
//! counting or fetching) all answer `400 {"error": "Data error"}`.
//!
//! ```rust,ignore
//! use restcrate::ApiError;
//!
//! fn scope(select: Select<Entity>, ctx: &RequestContext) -> Result<Select<Entity>, ApiError> {
//!     let owner = ctx.extensions.get::<CurrentUser>()
//!         .ok_or_else(|| ApiError::forbidden("Login required"))?;
//!     Ok(select.filter(Column::OwnerId.eq(owner.id)))
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use std::fmt;

/// Message returned to clients when a list query cannot be qualified or executed.
pub const DATA_ERROR_MESSAGE: &str = "Data error";

const DATABASE_ERROR_MESSAGE: &str = "A database error occurred";

#[derive(Debug)]
pub enum ApiError {
    /// 404. `id` is the key the client asked for, when there was one.
    NotFound {
        resource: String,
        id: Option<String>,
    },
    /// 400 for bodies and input outside the validated list parameters.
    BadRequest { message: String },
    /// 403, typically from a scoping hook.
    Forbidden { message: String },
    /// 409, e.g. a unique index rejected a store or update.
    Conflict { message: String },
    /// 422. Each entry is one complete sentence for the client.
    ValidationFailed { errors: Vec<String> },
    /// 400 "Data error". `internal` goes to the log only.
    DataError { internal: String },
    /// 500 for store failures outside the list pipeline.
    Database { message: String, internal: DbErr },
    /// 503. The request's token fired or its deadline passed before the query finished.
    Cancelled { reason: String },
    /// 500 for everything else.
    Internal {
        message: String,
        internal: Option<String>,
    },
}

impl ApiError {
    /// ```rust,ignore
    /// return Err(ApiError::not_found("Part", Some(key.to_string())));
    /// ```
    pub fn not_found(resource: impl Into<String>, id: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Reject request input with every problem found.
    ///
    /// ```rust,ignore
    /// return Err(ApiError::validation_failed(vec![
    ///     "The per_page field must be at least 1.".to_string(),
    /// ]));
    /// ```
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::ValidationFailed { errors }
    }

    /// A 422 with a single message.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            errors: vec![message.into()],
        }
    }

    /// Anything that went wrong while building or running a list query.
    pub fn data_error(internal: impl fmt::Display) -> Self {
        Self::DataError {
            internal: internal.to_string(),
        }
    }

    /// Map a store error from show/store/update/destroy. Unique violations become 409.
    ///
    /// ```rust,ignore
    /// let part = active.insert(db).await.map_err(ApiError::database)?;
    /// ```
    pub fn database(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            tracing::debug!(detail = %detail, "Unique constraint violation");
            return Self::conflict("Duplicate record");
        }
        Self::Database {
            message: DATABASE_ERROR_MESSAGE.to_string(),
            internal: err,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } | Self::DataError { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message a client is allowed to see.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound {
                resource,
                id: Some(id),
            } => format!("{resource} with ID '{id}' not found"),
            Self::NotFound { resource, id: None } => format!("{resource} not found"),
            Self::BadRequest { message }
            | Self::Forbidden { message }
            | Self::Conflict { message }
            | Self::Database { message, .. }
            | Self::Internal { message, .. } => message.clone(),
            Self::ValidationFailed { errors } => match errors.as_slice() {
                [only] => only.clone(),
                _ => format!("Validation failed: {}", errors.join(", ")),
            },
            Self::DataError { .. } => DATA_ERROR_MESSAGE.to_string(),
            Self::Cancelled { .. } => "Request cancelled".to_string(),
        }
    }

    fn log(&self) {
        match self {
            Self::Database { internal, .. } => {
                tracing::error!(error = ?internal, "Database error");
            }
            Self::DataError { internal } => {
                tracing::error!(details = %internal, "Data error while listing resources");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error");
            }
            Self::Cancelled { reason } => {
                tracing::warn!(reason = %reason, "Request cancelled before the query completed");
            }
            _ => {
                tracing::debug!(
                    status = %self.status_code(),
                    error = %self.user_message(),
                    "Request rejected"
                );
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = if let Self::ValidationFailed { errors } = &self {
            ErrorBody {
                error: "Validation failed".to_string(),
                details: Some(errors.clone()),
            }
        } else {
            ErrorBody {
                error: self.user_message(),
                details: None,
            }
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for ApiError {}

/// `DbErr::RecordNotFound` becomes 404, every other store error goes through [`ApiError::database`].
impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        if let DbErr::RecordNotFound(message) = &err {
            let resource = message.split_whitespace().next().unwrap_or("Resource");
            return Self::not_found(resource, None);
        }
        Self::database(err)
    }
}
