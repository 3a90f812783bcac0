//! PostgreSQL store backed by `sqlx`.
//!
//! Table and column names come from [`CatalogKind`], never from input, so the
//! statements below are assembled with `format!` and every value is bound.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use super::{Store, UnitOfWork};
use crate::error::Result;
use crate::model::{
    ApplicativeFields, BaseFields, BaseRow, CatalogKind, RelationRow, RelationView,
    TemplateFields, UserRecord,
};

/// Advisory lock keys for catalog-wide maintenance, one per family.
const TEMPLATE_CATALOG_LOCK: i64 = 0x6465_7370_0001;
const APPLICATIVE_CATALOG_LOCK: i64 = 0x6465_7370_0002;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }
}

struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

fn base_columns(kind: CatalogKind) -> &'static str {
    match kind {
        CatalogKind::Template => "id, novedad, nota_publica, nota_interna, nota_avances, plantilla",
        CatalogKind::Applicative => "id, nombre, url, categoria",
    }
}

fn base_from_row(kind: CatalogKind, row: &PgRow) -> Result<BaseRow> {
    let fields = match kind {
        CatalogKind::Template => BaseFields::Template(TemplateFields {
            novedad: row.try_get("novedad")?,
            nota_publica: row.try_get("nota_publica")?,
            nota_interna: row.try_get("nota_interna")?,
            nota_avances: row.try_get("nota_avances")?,
            plantilla: row.try_get("plantilla")?,
        }),
        CatalogKind::Applicative => BaseFields::Applicative(ApplicativeFields {
            nombre: row.try_get("nombre")?,
            url: row.try_get("url")?,
            categoria: row.try_get("categoria")?,
        }),
    };
    Ok(BaseRow {
        id: row.try_get("id")?,
        fields,
    })
}

fn user_from_row(row: &PgRow) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        nombre: row.try_get("nombre")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("contrasena_hash")?,
        creado_en: row.try_get("creado_en")?,
    })
}

const USER_COLUMNS: &str = "id, nombre, email, contrasena_hash, creado_en";

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn insert_user(&mut self, user: &UserRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO usuarios (id, nombre, email, contrasena_hash, creado_en) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id)
        .bind(&user.nombre)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.creado_en)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM usuarios WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM usuarios WHERE LOWER(email) = LOWER($1)");
        sqlx::query(&sql)
            .bind(email.trim())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn update_password_hash(&mut self, id: Uuid, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE usuarios SET contrasena_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_catalog(&mut self, kind: CatalogKind) -> Result<()> {
        let key = match kind {
            CatalogKind::Template => TEMPLATE_CATALOG_LOCK,
            CatalogKind::Applicative => APPLICATIVE_CATALOG_LOCK,
        };
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_bases(&mut self, kind: CatalogKind) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.base_table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *self.tx).await?;
        Ok(count as u64)
    }

    async fn list_bases(&mut self, kind: CatalogKind) -> Result<Vec<BaseRow>> {
        let sql = format!("SELECT {} FROM {}", base_columns(kind), kind.base_table());
        sqlx::query(&sql)
            .fetch_all(&mut *self.tx)
            .await?
            .iter()
            .map(|row| base_from_row(kind, row))
            .collect()
    }

    async fn lock_base(&mut self, kind: CatalogKind, id: Uuid) -> Result<Option<BaseRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
            base_columns(kind),
            kind.base_table()
        );
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| base_from_row(kind, &row))
            .transpose()
    }

    async fn insert_base(&mut self, row: &BaseRow) -> Result<()> {
        match &row.fields {
            BaseFields::Template(fields) => {
                sqlx::query(
                    "INSERT INTO plantillas_base \
                     (id, novedad, nota_publica, nota_interna, nota_avances, plantilla) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(row.id)
                .bind(&fields.novedad)
                .bind(&fields.nota_publica)
                .bind(&fields.nota_interna)
                .bind(&fields.nota_avances)
                .bind(&fields.plantilla)
                .execute(&mut *self.tx)
                .await?;
            }
            BaseFields::Applicative(fields) => {
                sqlx::query(
                    "INSERT INTO aplicativos_base (id, nombre, url, categoria) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(row.id)
                .bind(&fields.nombre)
                .bind(&fields.url)
                .bind(&fields.categoria)
                .execute(&mut *self.tx)
                .await?;
            }
        }
        Ok(())
    }

    async fn update_base(&mut self, row: &BaseRow) -> Result<bool> {
        let result = match &row.fields {
            BaseFields::Template(fields) => {
                sqlx::query(
                    "UPDATE plantillas_base \
                     SET novedad = $1, nota_publica = $2, nota_interna = $3, \
                         nota_avances = $4, plantilla = $5 \
                     WHERE id = $6",
                )
                .bind(&fields.novedad)
                .bind(&fields.nota_publica)
                .bind(&fields.nota_interna)
                .bind(&fields.nota_avances)
                .bind(&fields.plantilla)
                .bind(row.id)
                .execute(&mut *self.tx)
                .await?
            }
            BaseFields::Applicative(fields) => {
                sqlx::query(
                    "UPDATE aplicativos_base SET nombre = $1, url = $2, categoria = $3 \
                     WHERE id = $4",
                )
                .bind(&fields.nombre)
                .bind(&fields.url)
                .bind(&fields.categoria)
                .bind(row.id)
                .execute(&mut *self.tx)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn delete_base(&mut self, kind: CatalogKind, id: Uuid) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.base_table());
        let result = sqlx::query(&sql).bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_relation(&mut self, kind: CatalogKind, id: Uuid) -> Result<Option<RelationRow>> {
        let sql = format!(
            "SELECT id, usuario_id, {fk} AS base_id, creado_en FROM {table} \
             WHERE id = $1",
            fk = kind.relation_fk(),
            table = kind.relation_table()
        );
        let Some(row) = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(RelationRow {
            id: row.try_get("id")?,
            kind,
            usuario_id: row.try_get("usuario_id")?,
            base_id: row.try_get("base_id")?,
            creado_en: row.try_get::<DateTime<Utc>, _>("creado_en")?,
        }))
    }

    async fn relation_exists(
        &mut self,
        kind: CatalogKind,
        usuario_id: Uuid,
        base_id: Uuid,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {table} WHERE usuario_id = $1 AND {fk} = $2)",
            table = kind.relation_table(),
            fk = kind.relation_fk()
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(usuario_id)
            .bind(base_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn count_relations(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE {fk} = $1",
            table = kind.relation_table(),
            fk = kind.relation_fk()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(base_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count as u64)
    }

    async fn relation_users(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<Vec<Uuid>> {
        let sql = format!(
            "SELECT DISTINCT usuario_id FROM {table} WHERE {fk} = $1 ORDER BY usuario_id",
            table = kind.relation_table(),
            fk = kind.relation_fk()
        );
        let users: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(base_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(users)
    }

    async fn insert_relation(&mut self, relation: &RelationRow) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} (id, usuario_id, {fk}, creado_en) VALUES ($1, $2, $3, $4)",
            table = relation.kind.relation_table(),
            fk = relation.kind.relation_fk()
        );
        sqlx::query(&sql)
            .bind(relation.id)
            .bind(relation.usuario_id)
            .bind(relation.base_id)
            .bind(relation.creado_en)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_relation(&mut self, kind: CatalogKind, id: Uuid) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.relation_table());
        let result = sqlx::query(&sql).bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_relations_for_base(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {table} WHERE {fk} = $1",
            table = kind.relation_table(),
            fk = kind.relation_fk()
        );
        let result = sqlx::query(&sql)
            .bind(base_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_relations(
        &mut self,
        kind: CatalogKind,
        usuario_id: Uuid,
    ) -> Result<Vec<RelationView>> {
        let base_cols = base_columns(kind)
            .split(", ")
            .map(|col| format!("b.{col}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT r.id AS relation_id, r.creado_en, {base_cols} \
             FROM {rel} r \
             INNER JOIN {base} b ON r.{fk} = b.id \
             WHERE r.usuario_id = $1 \
             ORDER BY r.creado_en DESC",
            rel = kind.relation_table(),
            base = kind.base_table(),
            fk = kind.relation_fk()
        );

        sqlx::query(&sql)
            .bind(usuario_id)
            .fetch_all(&mut *self.tx)
            .await?
            .iter()
            .map(|row| -> Result<RelationView> {
                let base = base_from_row(kind, row)?;
                Ok(RelationView {
                    id: row.try_get("relation_id")?,
                    base_id: base.id,
                    fields: base.fields,
                    creado_en: row.try_get("creado_en")?,
                })
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
