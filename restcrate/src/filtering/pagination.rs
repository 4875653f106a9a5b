use axum::http::Extensions;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, Select};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;
use utoipa::ToSchema;

use crate::errors::ApiError;

/// A validated page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// Per-request state handed to every stage of the list pipeline and to the controller hooks.
///
/// `extensions` carries whatever the surrounding layer attached to the request (for example
/// the authenticated user), so scoping hooks can read it without global state.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub extensions: Extensions,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Keep the raw query pairs, in order, for building page links.
    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// URL of `page`, keeping every other query pair as it was.
    #[must_use]
    pub fn page_url(&self, page: u64) -> String {
        let page = page.to_string();
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut replaced = false;
        for (key, value) in &self.query {
            if key == "page" {
                if !replaced {
                    serializer.append_pair(key, &page);
                    replaced = true;
                }
            } else {
                serializer.append_pair(key, value);
            }
        }
        if !replaced {
            serializer.append_pair("page", &page);
        }
        format!("{}?{}", self.path, serializer.finish())
    }

    /// Run `work` unless the token is cancelled or the deadline passes first.
    ///
    /// # Errors
    ///
    /// `ApiError::Cancelled` when the request was abandoned, `ApiError::DataError` when the
    /// store fails.
    pub async fn run<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ApiError::cancelled("cancellation token fired")),
            () = wait_for(self.deadline) => Err(ApiError::cancelled("deadline exceeded")),
            result = work => result.map_err(ApiError::data_error),
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Page links, each a full URL with `page` overridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaginationLinks {
    pub first: String,
    pub last: String,
    pub prev: Option<String>,
    pub next: Option<String>,
}

/// Page metadata. `from` and `to` are 1-based item positions, `None` on an empty page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    pub current_page: u64,
    pub from: Option<u64>,
    pub last_page: u64,
    pub next_page_url: Option<String>,
    pub path: String,
    pub per_page: u64,
    pub prev_page_url: Option<String>,
    pub to: Option<u64>,
    pub total: u64,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    #[serde(rename = "data")]
    pub items: Vec<T>,
    pub links: PaginationLinks,
    pub meta: PaginationMeta,
}

impl<T> PagedResult<T> {
    /// Wrap a fetched page with its links and metadata.
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, request: PageRequest, ctx: &RequestContext) -> Self {
        let last_page = total.div_ceil(request.per_page).max(1);
        let current_page = request.page;

        let (from, to) = if items.is_empty() {
            (None, None)
        } else {
            let from = request.offset() + 1;
            (Some(from), Some(from + items.len() as u64 - 1))
        };
        let prev = (current_page > 1).then(|| ctx.page_url(current_page - 1));
        let next = (current_page < last_page).then(|| ctx.page_url(current_page + 1));

        Self {
            items,
            links: PaginationLinks {
                first: ctx.page_url(1),
                last: ctx.page_url(last_page),
                prev: prev.clone(),
                next: next.clone(),
            },
            meta: PaginationMeta {
                current_page,
                from,
                last_page,
                next_page_url: next,
                path: ctx.path.clone(),
                per_page: request.per_page,
                prev_page_url: prev,
                to,
                total,
            },
        }
    }

    /// Transform every item, keeping links and metadata.
    ///
    /// # Errors
    ///
    /// The first error returned by `f`.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PagedResult<U>, E> {
        Ok(PagedResult {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            links: self.links,
            meta: self.meta,
        })
    }
}

/// Execute the qualified query: one count over the full predicate set, one page fetch.
///
/// A page that starts at or past `total` is answered without fetching, so its offset is never
/// computed by the store layer.
///
/// # Errors
///
/// `ApiError::Cancelled` or `ApiError::DataError`, see [`RequestContext::run`].
pub async fn fetch_page<E>(
    db: &DatabaseConnection,
    select: Select<E>,
    request: PageRequest,
    ctx: &RequestContext,
) -> Result<PagedResult<E::Model>, ApiError>
where
    E: EntityTrait,
    E::Model: Sync,
{
    let (items, total) = ctx
        .run(async {
            let paginator = select.paginate(db, request.per_page);
            let total = paginator.num_items().await?;
            if request.offset() >= total {
                return Ok((Vec::new(), total));
            }
            let items = paginator.fetch_page(request.page - 1).await?;
            Ok((items, total))
        })
        .await?;

    tracing::debug!(
        page = request.page,
        per_page = request.per_page,
        total,
        returned = items.len(),
        "Fetched page"
    );
    Ok(PagedResult::new(items, total, request, ctx))
}
