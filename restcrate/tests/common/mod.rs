#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr,
    QueryFilter, Schema, Select, Set,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use restcrate::validation::{FieldRule, PayloadRules};
use restcrate::{
    ApiError, FilterValue, RequestContext, ResourceConfig, ResourceController, SortDirection,
    resource_router,
};

pub mod part_entity;
pub use part_entity as part;

/// Name of the authenticated caller, set as a request extension by the surrounding app.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub String);

pub struct PartController {
    config: ResourceConfig<part::Entity>,
    rules: PayloadRules,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl PartController {
    pub fn new() -> Self {
        Self {
            config: ResourceConfig::new("Part")
                .with_custom_filters(["in_stock"])
                .with_default_sort("code", SortDirection::Asc)
                .with_fillable(["code", "designation", "quantity", "price_unit", "owner"]),
            rules: PayloadRules::new()
                .field("code", [FieldRule::Required, FieldRule::MaxLength(32)])
                .field("designation", [FieldRule::Required])
                .field(
                    "quantity",
                    [FieldRule::Integer {
                        min: Some(0),
                        max: None,
                    }],
                )
                .field(
                    "price_unit",
                    [FieldRule::Numeric {
                        min: Some(0.0),
                        max: None,
                    }],
                ),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_config(mut self, config: ResourceConfig<part::Entity>) -> Self {
        self.config = config;
        self
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ResourceController for PartController {
    type Model = part::Model;
    type Entity = part::Entity;
    type ActiveModel = part::ActiveModel;

    fn config(&self) -> &ResourceConfig<part::Entity> {
        &self.config
    }

    fn qualify_with_custom_filters(
        &self,
        select: Select<part::Entity>,
        filters: &BTreeMap<String, FilterValue>,
        _ctx: &RequestContext,
    ) -> Result<Select<part::Entity>, ApiError> {
        match filters.get("in_stock") {
            Some(FilterValue::Scalar(v)) if v == "1" => {
                Ok(select.filter(part::Column::Quantity.gt(0)))
            }
            Some(FilterValue::Scalar(v)) if v == "0" => {
                Ok(select.filter(part::Column::Quantity.eq(0)))
            }
            Some(_) => Err(ApiError::invalid_parameter(
                "The filter.in_stock field must be 0 or 1.",
            )),
            None => Ok(select),
        }
    }

    fn qualify_collection_query(
        &self,
        select: Select<part::Entity>,
        ctx: &RequestContext,
    ) -> Result<Select<part::Entity>, ApiError> {
        Ok(match ctx.extensions.get::<CurrentUser>() {
            Some(CurrentUser(name)) => select.filter(part::Column::Owner.eq(name.clone())),
            None => select,
        })
    }

    fn transform(&self, model: part::Model) -> Result<Value, ApiError> {
        let stock_value = f64::from(model.quantity) * model.price_unit;
        let mut value = serde_json::to_value(model)
            .map_err(|e| ApiError::internal("Failed to serialize part", Some(e.to_string())))?;
        value["stock_value"] = json!(stock_value);
        Ok(value)
    }

    fn validate_payload(
        &self,
        payload: &Map<String, Value>,
        existing: Option<&part::Model>,
    ) -> Result<(), ApiError> {
        self.rules.validate(payload, existing.is_some())
    }

    async fn before_store(
        &self,
        _db: &DatabaseConnection,
        mut active: part::ActiveModel,
        payload: &Map<String, Value>,
        ctx: &RequestContext,
    ) -> Result<part::ActiveModel, ApiError> {
        if !payload.contains_key("owner")
            && let Some(CurrentUser(name)) = ctx.extensions.get::<CurrentUser>()
        {
            active.owner = Set(Some(name.clone()));
        }
        Ok(active)
    }

    async fn after_store(
        &self,
        _db: &DatabaseConnection,
        model: &part::Model,
        _ctx: &RequestContext,
    ) -> Result<(), ApiError> {
        self.record(format!("stored {}", model.code));
        Ok(())
    }

    async fn after_update(
        &self,
        _db: &DatabaseConnection,
        model: &part::Model,
        _ctx: &RequestContext,
    ) -> Result<(), ApiError> {
        self.record(format!("updated {}", model.code));
        Ok(())
    }
}

fn test_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string())
}

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(test_database_url()).await?;
    let backend = db.get_database_backend();
    let _ = db.execute_unprepared("DROP TABLE IF EXISTS parts").await;
    let create = Schema::new(backend).create_table_from_entity(part::Entity);
    db.execute(backend.build(&create)).await?;
    Ok(db)
}

pub struct SeedPart {
    pub uuid: &'static str,
    pub code: &'static str,
    pub designation: &'static str,
    pub quantity: i32,
    pub price_unit: f64,
    pub owner: Option<&'static str>,
}

pub const SEED: [SeedPart; 5] = [
    SeedPart {
        uuid: "6f1c1b1e-0000-4000-8000-000000000001",
        code: "BOLT-M6",
        designation: "Steel bolt M6",
        quantity: 120,
        price_unit: 0.25,
        owner: Some("alice"),
    },
    SeedPart {
        uuid: "6f1c1b1e-0000-4000-8000-000000000002",
        code: "BOLT-M8",
        designation: "Steel bolt M8",
        quantity: 0,
        price_unit: 0.4,
        owner: Some("bob"),
    },
    SeedPart {
        uuid: "6f1c1b1e-0000-4000-8000-000000000003",
        code: "NUT-M6",
        designation: "Brass nut M6",
        quantity: 300,
        price_unit: 0.1,
        owner: Some("alice"),
    },
    SeedPart {
        uuid: "6f1c1b1e-0000-4000-8000-000000000004",
        code: "WASHER-12",
        designation: "Nylon washer",
        quantity: 42,
        price_unit: 0.05,
        owner: None,
    },
    SeedPart {
        uuid: "6f1c1b1e-0000-4000-8000-000000000005",
        code: "GEAR-20",
        designation: "Spur gear 20 teeth",
        quantity: 7,
        price_unit: 12.5,
        owner: Some("bob"),
    },
];

/// Insert the seed rows in order, so ids are 1 to 5.
pub async fn seed(db: &DatabaseConnection) -> Result<(), DbErr> {
    for part in &SEED {
        part::ActiveModel {
            uuid: Set(part.uuid.to_string()),
            code: Set(part.code.to_string()),
            designation: Set(part.designation.to_string()),
            quantity: Set(part.quantity),
            price_unit: Set(part.price_unit),
            owner: Set(part.owner.map(str::to_string)),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

pub async fn setup_seeded_db() -> DatabaseConnection {
    let db = setup_test_db().await.expect("Failed to setup test database");
    seed(&db).await.expect("Failed to seed parts");
    db
}

pub fn setup_test_app(db: &DatabaseConnection) -> Router {
    Router::new().nest("/parts", resource_router(PartController::new(), db.clone()))
}

/// Codes of a listing response, in order.
pub fn codes(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|item| item["code"].as_str().unwrap_or_default().to_string())
        .collect()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn send_json(app: &Router, method: &str, uri: &str, body: &Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}
