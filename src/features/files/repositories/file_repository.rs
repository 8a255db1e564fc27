use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::core::error::{AppError, Result};
use crate::features::files::dtos::FileQueryParams;
use crate::features::files::models::{File, FileUpdate, NewFile};

/// Persistence of file and modification records
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn create(&self, file: NewFile) -> Result<File>;

    /// Insert all records or none of them
    async fn create_modifications(&self, files: Vec<NewFile>) -> Result<Vec<File>>;

    async fn find(&self, id: i64) -> Result<Option<File>>;

    async fn modifications(&self, parent_id: i64) -> Result<Vec<File>>;

    async fn count_modifications(&self, parent_id: i64) -> Result<i64>;

    /// Page of original files matching the filter, with the total match count
    async fn list(&self, params: &FileQueryParams) -> Result<(Vec<File>, i64)>;

    /// Most recently updated published file carrying `slug`
    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<File>>;

    /// `None` when no file has this id
    async fn update(&self, id: i64, changes: &FileUpdate) -> Result<Option<File>>;

    /// Delete a file together with its modifications, returning the removed rows
    async fn delete_with_modifications(&self, id: i64) -> Result<Vec<File>>;
}

/// PostgreSQL-backed repository
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert<'e, E>(executor: E, file: NewFile) -> std::result::Result<File, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, File>(
        r#"
        INSERT INTO files (
            parent_id, title, filename, mime, extension, size, disk, path,
            slug, published, description, author_id, options
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING *
        "#,
    )
    .bind(file.parent_id)
    .bind(file.title)
    .bind(file.filename)
    .bind(file.mime)
    .bind(file.extension)
    .bind(file.size)
    .bind(file.disk)
    .bind(file.path)
    .bind(file.slug)
    .bind(file.published)
    .bind(file.description)
    .bind(file.author_id)
    .bind(file.options)
    .fetch_one(executor)
    .await
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append the list filter to a query that already has a WHERE clause
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &FileQueryParams) {
    if let Some(search) = params.search_term() {
        let pattern = format!("%{}%", escape_like(search));
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR filename ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(mime) = params.mime_prefix() {
        builder
            .push(" AND mime ILIKE ")
            .push_bind(format!("{}%", escape_like(mime)));
    }

    if let Some(published) = params.published {
        builder.push(" AND published = ").push_bind(published);
    }
}

fn list_query(params: &FileQueryParams) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT * FROM files WHERE parent_id IS NULL");
    push_filters(&mut builder, params);
    let direction = params.sort.as_sql();
    builder
        .push(format!(" ORDER BY created_at {}, id {}", direction, direction))
        .push(" OFFSET ")
        .push_bind(params.offset())
        .push(" LIMIT ")
        .push_bind(params.limit());
    builder
}

fn count_query(params: &FileQueryParams) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM files WHERE parent_id IS NULL");
    push_filters(&mut builder, params);
    builder
}

fn update_query(id: i64, changes: &FileUpdate) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE files SET updated_at = NOW()");
    if let Some(title) = &changes.title {
        builder.push(", title = ").push_bind(title.clone());
    }
    if let Some(description) = &changes.description {
        builder.push(", description = ").push_bind(description.clone());
    }
    if let Some(published) = changes.published {
        builder.push(", published = ").push_bind(published);
    }
    if let Some(slug) = &changes.slug {
        builder.push(", slug = ").push_bind(slug.clone());
    }
    builder.push(" WHERE id = ").push_bind(id).push(" RETURNING *");
    builder
}

fn log_db_error(action: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |e| {
        tracing::error!("Failed to {}: {:?}", action, e);
        AppError::Database(e)
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn create(&self, file: NewFile) -> Result<File> {
        insert(&self.pool, file)
            .await
            .map_err(log_db_error("create file"))
    }

    async fn create_modifications(&self, files: Vec<NewFile>) -> Result<Vec<File>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(log_db_error("begin transaction"))?;

        let mut created = Vec::with_capacity(files.len());
        for file in files {
            let row = insert(&mut *tx, file)
                .await
                .map_err(log_db_error("create modification"))?;
            created.push(row);
        }

        tx.commit()
            .await
            .map_err(log_db_error("commit modifications"))?;

        Ok(created)
    }

    async fn find(&self, id: i64) -> Result<Option<File>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(log_db_error("fetch file"))
    }

    async fn modifications(&self, parent_id: i64) -> Result<Vec<File>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE parent_id = $1 ORDER BY id")
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(log_db_error("fetch modifications"))
    }

    async fn count_modifications(&self, parent_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files WHERE parent_id = $1")
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(log_db_error("count modifications"))
    }

    async fn list(&self, params: &FileQueryParams) -> Result<(Vec<File>, i64)> {
        let total = count_query(params)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(log_db_error("count files"))?;

        let files = list_query(params)
            .build_query_as::<File>()
            .fetch_all(&self.pool)
            .await
            .map_err(log_db_error("list files"))?;

        Ok((files, total))
    }

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<File>> {
        sqlx::query_as::<_, File>(
            r#"
            SELECT * FROM files
            WHERE slug = $1 AND published = TRUE
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(log_db_error("fetch file by slug"))
    }

    async fn update(&self, id: i64, changes: &FileUpdate) -> Result<Option<File>> {
        update_query(id, changes)
            .build_query_as::<File>()
            .fetch_optional(&self.pool)
            .await
            .map_err(log_db_error("update file"))
    }

    async fn delete_with_modifications(&self, id: i64) -> Result<Vec<File>> {
        sqlx::query_as::<_, File>(
            "DELETE FROM files WHERE id = $1 OR parent_id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(log_db_error("delete file"))
    }
}
