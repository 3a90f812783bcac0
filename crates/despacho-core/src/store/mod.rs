//! Persistence seam.
//!
//! A [`Store`] hands out [`UnitOfWork`] handles. Every statement issued
//! through a handle belongs to one transaction: nothing is visible to other
//! handles until [`UnitOfWork::commit`], and dropping the handle without
//! committing discards all of its writes.
//!
//! Row-level rules (reference counting, reserved labels, seeding) live in
//! [`crate::lifecycle`] and [`crate::seeder`]; stores only move rows.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{BaseRow, CatalogKind, RelationRow, RelationView, UserRecord};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    // users
    async fn insert_user(&mut self, user: &UserRecord) -> Result<()>;
    async fn find_user(&mut self, id: Uuid) -> Result<Option<UserRecord>>;
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<UserRecord>>;
    async fn update_password_hash(&mut self, id: Uuid, password_hash: &str) -> Result<bool>;

    // base catalog

    /// Serializes catalog-wide maintenance (seeding) for `kind` until the
    /// unit of work ends.
    async fn lock_catalog(&mut self, kind: CatalogKind) -> Result<()>;
    async fn count_bases(&mut self, kind: CatalogKind) -> Result<u64>;
    async fn list_bases(&mut self, kind: CatalogKind) -> Result<Vec<BaseRow>>;
    /// Fetches a base row and locks it against concurrent deletes or
    /// relation changes for the rest of the unit of work.
    async fn lock_base(&mut self, kind: CatalogKind, id: Uuid) -> Result<Option<BaseRow>>;
    async fn insert_base(&mut self, row: &BaseRow) -> Result<()>;
    async fn update_base(&mut self, row: &BaseRow) -> Result<bool>;
    async fn delete_base(&mut self, kind: CatalogKind, id: Uuid) -> Result<bool>;

    // relations
    async fn find_relation(&mut self, kind: CatalogKind, id: Uuid) -> Result<Option<RelationRow>>;
    async fn relation_exists(
        &mut self,
        kind: CatalogKind,
        usuario_id: Uuid,
        base_id: Uuid,
    ) -> Result<bool>;
    async fn count_relations(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<u64>;
    async fn relation_users(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<Vec<Uuid>>;
    async fn insert_relation(&mut self, relation: &RelationRow) -> Result<()>;
    async fn delete_relation(&mut self, kind: CatalogKind, id: Uuid) -> Result<bool>;
    async fn delete_relations_for_base(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<u64>;
    /// Relations of one user joined with their base rows, newest first.
    async fn list_relations(
        &mut self,
        kind: CatalogKind,
        usuario_id: Uuid,
    ) -> Result<Vec<RelationView>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

pub type SharedStore = Arc<dyn Store>;
