use sea_orm::entity::prelude::*;

/// One row per generated thumbnail; the composite key enforces a single
/// descriptor per `(source_id, size)`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "thumbnail")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub source_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub size: String,

    /// Blob store path of the thumbnail bytes.
    pub path: String,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
