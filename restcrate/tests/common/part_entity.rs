use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use restcrate::Searchable;

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
    pub owner: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Searchable for Entity {
    fn searchable_columns() -> Vec<Column> {
        vec![Column::Code, Column::Designation]
    }
}
