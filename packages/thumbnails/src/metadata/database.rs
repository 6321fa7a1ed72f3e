use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::debug;

use super::MetadataStore;
use crate::descriptor::ThumbnailDescriptor;
use crate::entity::{source, thumbnail};
use crate::error::MetadataError;

/// Relational metadata store: one `thumbnail` row per descriptor.
///
/// Every call is a single query against the table. There is no bulk lookup
/// across sources, so batch prefetch is refused.
#[derive(Clone, Debug)]
pub struct DatabaseMetadataStore {
    db: DatabaseConnection,
}

impl DatabaseMetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open a connection pool for `db_url`.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, MetadataError> {
        let mut opt = ConnectOptions::new(db_url.to_owned());
        opt.max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        Ok(Self { db })
    }

    /// Create the `thumbnail_source` and `thumbnail` tables if missing.
    pub async fn sync_schema(&self) -> Result<(), MetadataError> {
        self.db
            .get_schema_registry("thumbnails::entity::*")
            .sync(&self.db)
            .await?;
        Ok(())
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl From<thumbnail::Model> for ThumbnailDescriptor {
    fn from(model: thumbnail::Model) -> Self {
        Self {
            source_id: model.source_id,
            size: model.size,
            path: model.path,
            created_at: model.created_at,
        }
    }
}

#[async_trait]
impl MetadataStore for DatabaseMetadataStore {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn get_one(
        &self,
        source_id: &str,
        size: &str,
    ) -> Result<Option<ThumbnailDescriptor>, MetadataError> {
        let row = thumbnail::Entity::find()
            .filter(thumbnail::Column::SourceId.eq(source_id))
            .filter(thumbnail::Column::Size.eq(size))
            .one(&self.db)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn get_all(&self, source_id: &str) -> Result<Vec<ThumbnailDescriptor>, MetadataError> {
        let rows = thumbnail::Entity::find()
            .filter(thumbnail::Column::SourceId.eq(source_id))
            .order_by_asc(thumbnail::Column::Size)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add(&self, descriptor: &ThumbnailDescriptor) -> Result<(), MetadataError> {
        let model = thumbnail::ActiveModel {
            source_id: Set(descriptor.source_id.clone()),
            size: Set(descriptor.size.clone()),
            path: Set(descriptor.path.clone()),
            created_at: Set(descriptor.created_at),
        };

        thumbnail::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([thumbnail::Column::SourceId, thumbnail::Column::Size])
                    .update_columns([thumbnail::Column::Path, thumbnail::Column::CreatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(
            source_id = %descriptor.source_id,
            size = %descriptor.size,
            path = %descriptor.path,
            "Thumbnail row upserted"
        );
        Ok(())
    }

    async fn add_source(&self, source_id: &str) -> Result<(), MetadataError> {
        let model = source::ActiveModel {
            name: Set(source_id.to_string()),
            created_at: Set(Utc::now()),
        };

        let result = source::Entity::insert(model)
            .on_conflict(
                OnConflict::column(source::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await;

        match result {
            Ok(_) | Err(DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, source_id: &str, size: &str) -> Result<bool, MetadataError> {
        let result = thumbnail::Entity::delete_many()
            .filter(thumbnail::Column::SourceId.eq(source_id))
            .filter(thumbnail::Column::Size.eq(size))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
