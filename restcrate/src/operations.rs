//! # Resource Controllers
//!
//! [`ResourceController`] gives an entity list/show/store/update/destroy semantics. Every
//! operation has a default; controllers override the hooks they need and nothing else.
//!
//! ## Hooks
//!
//! - **Query hooks** (`qualify_with_custom_filters`, `qualify_collection_query`) are synchronous and
//!   only extend the query. They run after search and automatic filters, before sorting.
//! - **Write hooks** (`before_store`, `after_store`, `before_update`, `after_update`) are async and
//!   may touch the database.
//! - **`transform`** shapes the JSON sent back for every model.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use restcrate::{ApiError, FilterValue, RequestContext, ResourceConfig, ResourceController};
//!
//! pub struct PartController {
//!     config: ResourceConfig<part::Entity>,
//! }
//!
//! #[async_trait]
//! impl ResourceController for PartController {
//!     type Model = part::Model;
//!     type Entity = part::Entity;
//!     type ActiveModel = part::ActiveModel;
//!
//!     fn config(&self) -> &ResourceConfig<part::Entity> {
//!         &self.config
//!     }
//!
//!     // Only show the caller's own parts
//!     fn qualify_collection_query(
//!         &self,
//!         select: Select<part::Entity>,
//!         ctx: &RequestContext,
//!     ) -> Result<Select<part::Entity>, ApiError> {
//!         let user = ctx.extensions.get::<CurrentUser>()
//!             .ok_or_else(|| ApiError::forbidden("Login required"))?;
//!         Ok(select.filter(part::Column::Owner.eq(user.name.clone())))
//!     }
//! }
//! ```

use async_trait::async_trait;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ColumnType, DatabaseConnection,
    EntityTrait, FromQueryResult, IdenStatic, IntoActiveModel, Iterable, ModelTrait,
    PrimaryKeyToColumn, QueryFilter, Select, TryIntoModel, Value as DbValue,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::core::listing::list_entities;
use crate::core::traits::{ResourceConfig, Searchable};
use crate::errors::ApiError;
use crate::filtering::conditions::coerce_value;
use crate::filtering::{FilterValue, PagedResult, RequestContext};
use crate::models::ListParams;

/// A REST resource over one Sea-ORM entity.
#[async_trait]
pub trait ResourceController: Send + Sync + 'static {
    type Model: ModelTrait<Entity = Self::Entity>
        + FromQueryResult
        + IntoActiveModel<Self::ActiveModel>
        + Serialize
        + DeserializeOwned
        + Send
        + Sync;
    type Entity: Searchable + EntityTrait<Model = Self::Model> + Sync;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity>
        + ActiveModelBehavior
        + TryIntoModel<Self::Model>
        + Send
        + Sync;

    /// Per-resource configuration, fixed at startup.
    fn config(&self) -> &ResourceConfig<Self::Entity>;

    // ============================================================================
    // Query hooks
    // ============================================================================

    /// Apply filters whose keys were declared with `ResourceConfig::with_custom_filters`.
    ///
    /// Values arrive cleaned: `{"=": v}` is already `v`, pipes are not split.
    ///
    /// # Errors
    ///
    /// Whatever the implementation decides; the default never fails.
    fn qualify_with_custom_filters(
        &self,
        select: Select<Self::Entity>,
        filters: &BTreeMap<String, FilterValue>,
        ctx: &RequestContext,
    ) -> Result<Select<Self::Entity>, ApiError> {
        let _ = (filters, ctx);
        Ok(select)
    }

    /// Scope the whole collection, e.g. to the caller's own records.
    ///
    /// # Errors
    ///
    /// Whatever the implementation decides; the default never fails.
    fn qualify_collection_query(
        &self,
        select: Select<Self::Entity>,
        ctx: &RequestContext,
    ) -> Result<Select<Self::Entity>, ApiError> {
        let _ = ctx;
        Ok(select)
    }

    /// JSON representation of one model.
    ///
    /// # Errors
    ///
    /// `ApiError::Internal` when serialization fails.
    fn transform(&self, model: Self::Model) -> Result<Value, ApiError> {
        serde_json::to_value(model).map_err(|e| {
            ApiError::internal("Failed to serialize resource", Some(e.to_string()))
        })
    }

    // ============================================================================
    // Write hooks
    // ============================================================================

    /// Check a store (`existing` is `None`) or update payload after fillable filtering.
    ///
    /// # Errors
    ///
    /// Typically `ApiError::ValidationFailed`.
    fn validate_payload(
        &self,
        payload: &Map<String, Value>,
        existing: Option<&Self::Model>,
    ) -> Result<(), ApiError> {
        let _ = (payload, existing);
        Ok(())
    }

    /// Adjust the active model right before insert.
    async fn before_store(
        &self,
        _db: &DatabaseConnection,
        active: Self::ActiveModel,
        _payload: &Map<String, Value>,
        _ctx: &RequestContext,
    ) -> Result<Self::ActiveModel, ApiError> {
        Ok(active)
    }

    /// Runs once the new row is inserted.
    async fn after_store(
        &self,
        _db: &DatabaseConnection,
        _model: &Self::Model,
        _ctx: &RequestContext,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    /// Adjust the active model right before it is saved.
    async fn before_update(
        &self,
        _db: &DatabaseConnection,
        active: Self::ActiveModel,
        _existing: &Self::Model,
        _payload: &Map<String, Value>,
        _ctx: &RequestContext,
    ) -> Result<Self::ActiveModel, ApiError> {
        Ok(active)
    }

    /// Runs once the row is saved.
    async fn after_update(
        &self,
        _db: &DatabaseConnection,
        _model: &Self::Model,
        _ctx: &RequestContext,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    // ============================================================================
    // Operations
    // ============================================================================

    /// Resolve `key` by primary key, then by the uuid column.
    ///
    /// # Errors
    ///
    /// `ApiError::NotFound` when neither lookup matches.
    async fn find_resource(
        &self,
        db: &DatabaseConnection,
        key: &str,
    ) -> Result<Self::Model, ApiError> {
        let config = self.config();

        if let Some(column) = single_primary_key::<Self::Entity>() {
            match coerce_value(column, key) {
                Ok(value) => {
                    let found = Self::Entity::find()
                        .filter(column.eq(value))
                        .one(db)
                        .await
                        .map_err(ApiError::database)?;
                    if let Some(model) = found {
                        return Ok(model);
                    }
                }
                Err(err) => tracing::debug!(key, error = %err, "Key is not a primary key value"),
            }
        }

        tracing::debug!(
            resource = config.name(),
            key,
            "Primary key lookup failed, trying uuid"
        );

        if let Some(column) = config.uuid_column()
            && let Ok(value) = coerce_value(column, key)
        {
            let found = Self::Entity::find()
                .filter(column.eq(value))
                .one(db)
                .await
                .map_err(ApiError::database)?;
            if let Some(model) = found {
                return Ok(model);
            }
        }

        tracing::warn!(
            resource = config.name(),
            key,
            "No resource matches the key by primary key or uuid"
        );
        Err(ApiError::not_found(config.name(), Some(key.to_string())))
    }

    /// List one page of the collection.
    ///
    /// # Errors
    ///
    /// See [`list_entities`].
    async fn index(
        &self,
        db: &DatabaseConnection,
        params: &ListParams,
        ctx: &RequestContext,
    ) -> Result<PagedResult<Value>, ApiError> {
        list_entities(self, db, params, ctx).await
    }

    /// # Errors
    ///
    /// `ApiError::NotFound` when the key resolves to nothing.
    async fn show(&self, db: &DatabaseConnection, key: &str) -> Result<Value, ApiError> {
        let model = self.find_resource(db, key).await?;
        self.transform(model)
    }

    /// Create a resource from a JSON object.
    ///
    /// # Errors
    ///
    /// `ApiError::BadRequest` for a non-object body, `ApiError::ValidationFailed` for rejected
    /// payloads, `ApiError::Conflict` on unique violations.
    async fn store(
        &self,
        db: &DatabaseConnection,
        payload: Value,
        ctx: &RequestContext,
    ) -> Result<Value, ApiError> {
        let config = self.config();
        let payload = fillable_payload(config, payload)?;
        self.validate_payload(&payload, None)?;

        let mut active = Self::ActiveModel::from_json(Value::Object(payload.clone()))
            .map_err(invalid_payload)?;
        if let Some(column) = config.uuid_column()
            && active.is_not_set(column)
        {
            active.set(column, fresh_uuid(column));
        }

        let active = self.before_store(db, active, &payload, ctx).await?;
        let model = active.insert(db).await.map_err(ApiError::database)?;
        self.after_store(db, &model, ctx).await?;

        tracing::debug!(resource = config.name(), "Stored resource");
        self.transform(model)
    }

    /// Merge a JSON object into an existing resource.
    ///
    /// # Errors
    ///
    /// As [`ResourceController::store`], plus `ApiError::NotFound`.
    async fn update(
        &self,
        db: &DatabaseConnection,
        key: &str,
        payload: Value,
        ctx: &RequestContext,
    ) -> Result<Value, ApiError> {
        let config = self.config();
        let existing = self.find_resource(db, key).await?;
        let payload = fillable_payload(config, payload)?;
        self.validate_payload(&payload, Some(&existing))?;

        let active = merge_payload::<Self::Entity, Self::ActiveModel>(&existing, &payload)?;
        let active = self
            .before_update(db, active, &existing, &payload, ctx)
            .await?;
        let model = if active.is_changed() {
            active.update(db).await.map_err(ApiError::database)?
        } else {
            existing
        };
        self.after_update(db, &model, ctx).await?;

        tracing::debug!(resource = config.name(), key, "Updated resource");
        self.transform(model)
    }

    /// # Errors
    ///
    /// `ApiError::NotFound` when the key resolves to nothing.
    async fn destroy(&self, db: &DatabaseConnection, key: &str) -> Result<(), ApiError> {
        let model = self.find_resource(db, key).await?;
        let active: Self::ActiveModel = model.into_active_model();
        active.delete(db).await.map_err(ApiError::database)?;
        tracing::debug!(resource = self.config().name(), key, "Deleted resource");
        Ok(())
    }
}

/// The primary key column, unless the key is composite.
fn single_primary_key<E: EntityTrait>() -> Option<E::Column> {
    let mut keys = E::PrimaryKey::iter();
    match (keys.next(), keys.next()) {
        (Some(key), None) => Some(key.into_column()),
        _ => None,
    }
}

fn fresh_uuid<C: ColumnTrait>(column: C) -> DbValue {
    let uuid = Uuid::new_v4();
    match column.def().get_column_type() {
        ColumnType::Uuid => DbValue::from(uuid),
        _ => DbValue::from(uuid.to_string()),
    }
}

/// Active model for `existing` with only the payload columns whose value differs marked `Set`.
/// Primary key columns never change.
fn merge_payload<E, A>(existing: &E::Model, payload: &Map<String, Value>) -> Result<A, ApiError>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<A> + Serialize + DeserializeOwned,
    A: ActiveModelTrait<Entity = E> + TryIntoModel<E::Model>,
{
    let Value::Object(mut merged) = serde_json::to_value(existing)
        .map_err(|e| ApiError::internal("Failed to serialize resource", Some(e.to_string())))?
    else {
        return Err(ApiError::internal("Resource is not a JSON object", None));
    };
    merged.extend(payload.clone());
    let candidate = A::from_json(Value::Object(merged)).map_err(invalid_payload)?;

    let mut active: A = existing.clone().into_active_model();
    for column in E::Column::iter() {
        if !payload.contains_key(column.as_str()) || is_primary_key::<E>(column) {
            continue;
        }
        if let Some(value) = candidate.get(column).into_value()
            && value != existing.get(column)
        {
            active.set(column, value);
        }
    }
    Ok(active)
}

fn is_primary_key<E: EntityTrait>(column: E::Column) -> bool {
    E::PrimaryKey::iter().any(|key| key.into_column().as_str() == column.as_str())
}

fn invalid_payload(err: sea_orm::DbErr) -> ApiError {
    tracing::debug!(error = %err, "Payload does not match the model");
    ApiError::validation_failed(vec!["The given data was invalid.".to_string()])
}

/// Keep only the declared fillable keys. Without a declaration every key is kept.
///
/// # Errors
///
/// `ApiError::BadRequest` when the body is not a JSON object.
pub fn fillable_payload<E: EntityTrait>(
    config: &ResourceConfig<E>,
    payload: Value,
) -> Result<Map<String, Value>, ApiError> {
    let Value::Object(mut map) = payload else {
        return Err(ApiError::bad_request("The request body must be a JSON object"));
    };
    if let Some(fillable) = config.fillable() {
        map.retain(|key, _| fillable.contains(key));
    }
    Ok(map)
}
