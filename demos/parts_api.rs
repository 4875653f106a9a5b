//! Parts inventory API with restcrate
//!
//! One resource, served by Axum over an in-memory SQLite database:
//!
//! - `GET /parts?q=bolt&filter[quantity][>]=10&sort_by=price_unit&order=asc&per_page=2`
//! - `GET /parts?filter[in_stock]=1` (custom filter)
//! - `GET|PUT|PATCH|DELETE /parts/{id or uuid}`, `POST /parts`
//!
//! ## Run the Example
//!
//! ```bash
//! RUST_LOG=restcrate=debug cargo run --example parts_api
//! ```
//!
//! In-flight list queries are cancelled on Ctrl-C.

use async_trait::async_trait;
use axum::{Router, extract::Request, middleware::Next};
use restcrate::{
    ApiError, FilterValue, RequestContext, ResourceConfig, ResourceController, Searchable,
    SortDirection, resource_router,
};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, QueryFilter, Schema, Set,
    entity::prelude::*,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod part {
    use super::{Deserialize, Searchable, Serialize};
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "parts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        #[serde(default)]
        pub id: i32,
        #[sea_orm(unique)]
        #[serde(default)]
        pub uuid: String,
        #[sea_orm(unique)]
        pub code: String,
        pub designation: String,
        pub quantity: i32,
        pub price_unit: f64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl Searchable for Entity {
        fn searchable_columns() -> Vec<Column> {
            vec![Column::Code, Column::Designation]
        }
    }
}

struct PartController {
    config: ResourceConfig<part::Entity>,
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
        Ok(match filters.get("in_stock") {
            Some(FilterValue::Scalar(v)) if v == "1" => {
                select.filter(part::Column::Quantity.gt(0))
            }
            Some(FilterValue::Scalar(v)) if v == "0" => {
                select.filter(part::Column::Quantity.eq(0))
            }
            _ => select,
        })
    }
}

async fn seed(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let create = Schema::new(backend).create_table_from_entity(part::Entity);
    db.execute(backend.build(&create)).await?;

    for (code, designation, quantity, price_unit) in [
        ("BOLT-M6", "Steel bolt M6", 120, 0.25),
        ("BOLT-M8", "Steel bolt M8", 0, 0.4),
        ("NUT-M6", "Brass nut M6", 300, 0.1),
        ("GEAR-20", "Spur gear 20 teeth", 7, 12.5),
    ] {
        part::ActiveModel {
            uuid: Set(uuid::Uuid::new_v4().to_string()),
            code: Set(code.to_string()),
            designation: Set(designation.to_string()),
            quantity: Set(quantity),
            price_unit: Set(price_unit),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let db = Database::connect(&database_url).await?;
    seed(&db).await?;

    let controller = PartController {
        config: ResourceConfig::new("Part")
            .with_custom_filters(["in_stock"])
            .with_default_sort("code", SortDirection::Asc)
            .with_fillable(["code", "designation", "quantity", "price_unit"]),
    };

    let shutdown = CancellationToken::new();
    let request_shutdown = shutdown.clone();
    let app = Router::new()
        .nest("/parts", resource_router(controller, db))
        .layer(axum::middleware::from_fn(
            move |mut request: Request, next: Next| {
                let token = request_shutdown.child_token();
                async move {
                    request.extensions_mut().insert(token);
                    next.run(request).await
                }
            },
        ));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("Parts API: http://0.0.0.0:3000/parts");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
