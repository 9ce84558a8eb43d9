//! SQLite-backed [`ContentStore`]
//!
//! One `entities` table. The full entity is kept as a JSON `document`; the
//! columns used for filtering are denormalized from it on every write.

use super::{ContentStore, EntityPatch, ListFilter, ListOrder, Page, StoredEntity};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{EditorialScoreResult, EntityId, NormalizedEntity};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

/// Create the `entities` table if it does not exist
pub async fn init_tables(pool: &SqlitePool) -> PipelineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            status TEXT NOT NULL,
            category TEXT,
            primary_contributor TEXT,
            release_year INTEGER,
            published INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL,
            document TEXT NOT NULL,
            editorial TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_status ON entities(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_entities_contributor ON entities(primary_contributor, release_year)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (entities)");

    Ok(())
}

pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    /// Wrap `pool`, creating tables as needed
    pub async fn new(pool: SqlitePool) -> PipelineResult<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch(&self, id: EntityId) -> PipelineResult<Option<StoredEntity>> {
        let row = sqlx::query(
            r#"
            SELECT document, version, published, editorial
            FROM entities
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_stored(&r)).transpose()
    }
}

fn row_to_stored(row: &SqliteRow) -> PipelineResult<StoredEntity> {
    let document: String = row.try_get("document")?;
    let editorial: Option<String> = row.try_get("editorial")?;

    Ok(StoredEntity {
        entity: serde_json::from_str(&document)?,
        version: row.try_get("version")?,
        published: row.try_get("published")?,
        editorial: editorial
            .map(|json| serde_json::from_str::<EditorialScoreResult>(&json))
            .transpose()?,
    })
}

fn contributor_key(entity: &NormalizedEntity) -> Option<String> {
    entity
        .primary_contributor()
        .map(|c| c.name.trim().to_lowercase())
}

fn encode_document(entity: &NormalizedEntity) -> PipelineResult<String> {
    let mut persisted = entity.clone();
    persisted.clear_working_state();
    Ok(serde_json::to_string(&persisted)?)
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn get(&self, id: EntityId) -> PipelineResult<StoredEntity> {
        self.fetch(id)
            .await?
            .ok_or_else(|| PipelineError::not_found(id))
    }

    async fn insert(&self, entity: &NormalizedEntity) -> PipelineResult<StoredEntity> {
        let document = encode_document(entity)?;

        let result = sqlx::query(
            r#"
            INSERT INTO entities (
                id, slug, entity_type, status, category, primary_contributor,
                release_year, published, version, document, editorial, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, 1, ?, NULL, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(entity.id.to_string())
        .bind(&entity.slug)
        .bind(entity.entity_type.as_str())
        .bind(entity.status.as_str())
        .bind(&entity.category)
        .bind(contributor_key(entity))
        .bind(entity.release_year)
        .bind(&document)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::InvalidInput(format!(
                "entity {} already exists",
                entity.id
            )));
        }

        debug!(entity_id = %entity.id, "Entity inserted");
        self.get(entity.id).await
    }

    async fn update(
        &self,
        id: EntityId,
        expected_version: i64,
        patch: &EntityPatch,
    ) -> PipelineResult<StoredEntity> {
        let mut stored = self.get(id).await?;
        if stored.version != expected_version {
            return Err(PipelineError::WriteConflict {
                id,
                expected: expected_version,
            });
        }

        patch.apply_to(&mut stored);
        stored.version = expected_version + 1;

        let entity = &stored.entity;
        let editorial = stored
            .editorial
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE entities SET
                slug = ?, entity_type = ?, status = ?, category = ?,
                primary_contributor = ?, release_year = ?, published = ?,
                version = ?, document = ?, editorial = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&entity.slug)
        .bind(entity.entity_type.as_str())
        .bind(entity.status.as_str())
        .bind(&entity.category)
        .bind(contributor_key(entity))
        .bind(entity.release_year)
        .bind(stored.published)
        .bind(stored.version)
        .bind(encode_document(entity)?)
        .bind(editorial)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        // Another writer got in between our read and write
        if result.rows_affected() == 0 {
            return Err(PipelineError::WriteConflict {
                id,
                expected: expected_version,
            });
        }

        debug!(entity_id = %id, version = stored.version, "Entity updated");
        Ok(stored)
    }

    async fn delete(&self, id: EntityId, expected_version: i64) -> PipelineResult<()> {
        let result = sqlx::query("DELETE FROM entities WHERE id = ? AND version = ?")
            .bind(id.to_string())
            .bind(expected_version)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return match self.fetch(id).await? {
                None => Err(PipelineError::not_found(id)),
                Some(_) => Err(PipelineError::WriteConflict {
                    id,
                    expected: expected_version,
                }),
            };
        }

        debug!(entity_id = %id, "Entity deleted");
        Ok(())
    }

    async fn list(&self, filter: &ListFilter, page: Page) -> PipelineResult<Vec<StoredEntity>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT document, version, published, editorial FROM entities WHERE 1 = 1",
        );

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(entity_type) = filter.entity_type {
            qb.push(" AND entity_type = ").push_bind(entity_type.as_str());
        }
        if let Some(name) = &filter.primary_contributor {
            qb.push(" AND primary_contributor = ")
                .push_bind(name.trim().to_lowercase());
        }
        if let Some((from, to)) = filter.release_years {
            qb.push(" AND release_year BETWEEN ")
                .push_bind(from)
                .push(" AND ")
                .push_bind(to);
        }
        if let Some(published) = filter.published {
            qb.push(" AND published = ").push_bind(published);
        }

        match filter.order {
            ListOrder::Slug => {
                qb.push(" ORDER BY slug, id");
            }
            ListOrder::NearestYear(year) => {
                qb.push(" ORDER BY release_year IS NULL, ABS(release_year - ")
                    .push_bind(year)
                    .push("), release_year DESC, slug, id");
            }
        }

        qb.push(" LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_stored).collect()
    }
}
