//! In-process store with the same transactional contract as PostgreSQL.
//!
//! A unit of work holds the store-wide lock for its whole lifetime and works
//! on a copy of the tables; commit swaps the copy in. Units are therefore
//! fully serialized, which is stronger than what the lifecycle rules need.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, UnitOfWork};
use crate::error::{DespachoError, Result};
use crate::model::{
    normalize_email, BaseRow, CatalogKind, RelationRow, RelationView, UserRecord,
};

#[derive(Debug, Clone)]
struct StoredRelation {
    seq: u64,
    row: RelationRow,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    bases: HashMap<CatalogKind, HashMap<Uuid, BaseRow>>,
    relations: HashMap<CatalogKind, HashMap<Uuid, StoredRelation>>,
    next_seq: u64,
}

impl Tables {
    fn bases(&self, kind: CatalogKind) -> impl Iterator<Item = &BaseRow> {
        self.bases.get(&kind).into_iter().flat_map(|rows| rows.values())
    }

    fn relations(&self, kind: CatalogKind) -> impl Iterator<Item = &StoredRelation> {
        self.relations
            .get(&kind)
            .into_iter()
            .flat_map(|rows| rows.values())
    }

    fn base(&self, kind: CatalogKind, id: Uuid) -> Option<&BaseRow> {
        self.bases.get(&kind).and_then(|rows| rows.get(&id))
    }
}

/// Row counts, for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub users: usize,
    pub template_bases: usize,
    pub applicative_bases: usize,
    pub template_relations: usize,
    pub applicative_relations: usize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> MemoryStats {
        let tables = self.tables.lock().await;
        MemoryStats {
            users: tables.users.len(),
            template_bases: tables.bases(CatalogKind::Template).count(),
            applicative_bases: tables.bases(CatalogKind::Applicative).count(),
            template_relations: tables.relations(CatalogKind::Template).count(),
            applicative_relations: tables.relations(CatalogKind::Applicative).count(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit { guard, working }))
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn insert_user(&mut self, user: &UserRecord) -> Result<()> {
        let email = normalize_email(&user.email);
        if self
            .working
            .users
            .values()
            .any(|existing| normalize_email(&existing.email) == email)
            || self.working.users.contains_key(&user.id)
        {
            return Err(DespachoError::Conflict("El registro ya existe".to_string()));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<UserRecord>> {
        let email = normalize_email(email);
        Ok(self
            .working
            .users
            .values()
            .find(|user| normalize_email(&user.email) == email)
            .cloned())
    }

    async fn update_password_hash(&mut self, id: Uuid, password_hash: &str) -> Result<bool> {
        match self.working.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lock_catalog(&mut self, _kind: CatalogKind) -> Result<()> {
        // The unit already holds the store-wide lock.
        Ok(())
    }

    async fn count_bases(&mut self, kind: CatalogKind) -> Result<u64> {
        Ok(self.working.bases(kind).count() as u64)
    }

    async fn list_bases(&mut self, kind: CatalogKind) -> Result<Vec<BaseRow>> {
        Ok(self.working.bases(kind).cloned().collect())
    }

    async fn lock_base(&mut self, kind: CatalogKind, id: Uuid) -> Result<Option<BaseRow>> {
        Ok(self.working.base(kind, id).cloned())
    }

    async fn insert_base(&mut self, row: &BaseRow) -> Result<()> {
        let rows = self.working.bases.entry(row.kind()).or_default();
        if rows.contains_key(&row.id) {
            return Err(DespachoError::Conflict("El registro ya existe".to_string()));
        }
        rows.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_base(&mut self, row: &BaseRow) -> Result<bool> {
        match self
            .working
            .bases
            .get_mut(&row.kind())
            .and_then(|rows| rows.get_mut(&row.id))
        {
            Some(existing) => {
                *existing = row.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_base(&mut self, kind: CatalogKind, id: Uuid) -> Result<bool> {
        if self
            .working
            .relations(kind)
            .any(|stored| stored.row.base_id == id)
        {
            return Err(DespachoError::Internal(format!(
                "{} {id} is still referenced",
                kind.base_table()
            )));
        }
        Ok(self
            .working
            .bases
            .get_mut(&kind)
            .and_then(|rows| rows.remove(&id))
            .is_some())
    }

    async fn find_relation(&mut self, kind: CatalogKind, id: Uuid) -> Result<Option<RelationRow>> {
        Ok(self
            .working
            .relations
            .get(&kind)
            .and_then(|rows| rows.get(&id))
            .map(|stored| stored.row.clone()))
    }

    async fn relation_exists(
        &mut self,
        kind: CatalogKind,
        usuario_id: Uuid,
        base_id: Uuid,
    ) -> Result<bool> {
        Ok(self
            .working
            .relations(kind)
            .any(|stored| stored.row.usuario_id == usuario_id && stored.row.base_id == base_id))
    }

    async fn count_relations(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<u64> {
        Ok(self
            .working
            .relations(kind)
            .filter(|stored| stored.row.base_id == base_id)
            .count() as u64)
    }

    async fn relation_users(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<Vec<Uuid>> {
        let mut users: Vec<Uuid> = self
            .working
            .relations(kind)
            .filter(|stored| stored.row.base_id == base_id)
            .map(|stored| stored.row.usuario_id)
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    async fn insert_relation(&mut self, relation: &RelationRow) -> Result<()> {
        if !self.working.users.contains_key(&relation.usuario_id)
            || self.working.base(relation.kind, relation.base_id).is_none()
        {
            return Err(DespachoError::Internal(format!(
                "{} references a missing row",
                relation.kind.relation_table()
            )));
        }
        let duplicate = self.working.relations(relation.kind).any(|stored| {
            stored.row.id == relation.id
                || (stored.row.usuario_id == relation.usuario_id
                    && stored.row.base_id == relation.base_id)
        });
        if duplicate {
            return Err(DespachoError::Conflict("El registro ya existe".to_string()));
        }

        self.working.next_seq += 1;
        let stored = StoredRelation {
            seq: self.working.next_seq,
            row: relation.clone(),
        };
        self.working
            .relations
            .entry(relation.kind)
            .or_default()
            .insert(relation.id, stored);
        Ok(())
    }

    async fn delete_relation(&mut self, kind: CatalogKind, id: Uuid) -> Result<bool> {
        Ok(self
            .working
            .relations
            .get_mut(&kind)
            .and_then(|rows| rows.remove(&id))
            .is_some())
    }

    async fn delete_relations_for_base(&mut self, kind: CatalogKind, base_id: Uuid) -> Result<u64> {
        let Some(rows) = self.working.relations.get_mut(&kind) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|_, stored| stored.row.base_id != base_id);
        Ok((before - rows.len()) as u64)
    }

    async fn list_relations(
        &mut self,
        kind: CatalogKind,
        usuario_id: Uuid,
    ) -> Result<Vec<RelationView>> {
        let mut rows: Vec<(&StoredRelation, &BaseRow)> = self
            .working
            .relations(kind)
            .filter(|stored| stored.row.usuario_id == usuario_id)
            .filter_map(|stored| {
                self.working
                    .base(kind, stored.row.base_id)
                    .map(|base| (stored, base))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| {
            b.row
                .creado_en
                .cmp(&a.row.creado_en)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(rows
            .into_iter()
            .map(|(stored, base)| RelationView {
                id: stored.row.id,
                base_id: base.id,
                fields: base.fields.clone(),
                creado_en: stored.row.creado_en,
            })
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
