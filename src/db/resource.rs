// src/db/resource.rs
// DOCUMENTATION: Contract shared by every CRUD-able resource
// PURPOSE: Lets the generic handlers in handlers::factory serve tours, users,
// reviews and bookings with one set of functions

use crate::db::ApiFeatures;
use crate::errors::AppError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// How a query-string value is parsed before it is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Uuid,
    Timestamp,
}

/// A filterable / sortable field: API name -> SQL expression
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Field { name, column, kind }
    }
}

pub fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a Field> {
    fields.iter().find(|f| f.name == name)
}

/// One resource served by the CRUD factory
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Row returned by list/create/update
    type Model: Serialize + Send;
    /// Row returned by get-one (may carry populated relations)
    type Detail: Serialize + Send;
    type Create: DeserializeOwned + Validate + Send + 'static;
    type Update: DeserializeOwned + Validate + Send + 'static;

    /// Singular name used in log lines
    const NAME: &'static str;

    /// Fields accepted in filters and sort keys
    const FIELDS: &'static [Field];

    async fn find_all(pool: &PgPool, features: &ApiFeatures) -> Result<Vec<Self::Model>, AppError>;

    async fn find_one(pool: &PgPool, id: Uuid) -> Result<Self::Detail, AppError>;

    async fn create(pool: &PgPool, req: Self::Create) -> Result<Self::Model, AppError>;

    async fn update(pool: &PgPool, id: Uuid, req: Self::Update) -> Result<Self::Model, AppError>;

    async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AppError>;
}
