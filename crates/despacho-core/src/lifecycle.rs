//! Shared/personal lifecycle of templates and applicatives.
//!
//! A base row lives exactly as long as at least one relation points to it.
//! There is no stored reference counter: every delete counts the relations
//! inside the same unit of work, after locking the base row.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DespachoError, Result};
use crate::model::{
    BaseDeletion, BaseFields, BaseRow, CascadeOutcome, CatalogKind, PersonalCreated,
    PurgeReport, RelationRow, RelationView,
};
use crate::store::{SharedStore, UnitOfWork};

pub struct LifecycleManager {
    store: SharedStore,
}

impl LifecycleManager {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    // -------- Relation CRUD --------

    pub async fn list_relations(
        &self,
        kind: CatalogKind,
        usuario_id: Uuid,
    ) -> Result<Vec<RelationView>> {
        let mut uow = self.store.begin().await?;
        uow.list_relations(kind, usuario_id).await
    }

    /// Template relations whose base carries a non-blank `nota_avances`.
    pub async fn list_avances(&self, usuario_id: Uuid) -> Result<Vec<RelationView>> {
        let relations = self.list_relations(CatalogKind::Template, usuario_id).await?;
        Ok(relations
            .into_iter()
            .filter(|view| match &view.fields {
                BaseFields::Template(fields) => fields.has_avances(),
                BaseFields::Applicative(_) => false,
            })
            .collect())
    }

    /// Binds an existing base row to a user.
    pub async fn create_relation(
        &self,
        kind: CatalogKind,
        usuario_id: Uuid,
        base_id: Uuid,
    ) -> Result<Uuid> {
        let mut uow = self.store.begin().await?;
        require_user(uow.as_mut(), usuario_id).await?;
        uow.lock_base(kind, base_id)
            .await?
            .ok_or_else(|| base_not_found(kind))?;

        if uow.relation_exists(kind, usuario_id, base_id).await? {
            return Err(DespachoError::Conflict(format!(
                "La {} ya está agregada para este usuario",
                kind.relation_noun()
            )));
        }

        let relation = RelationRow::new(kind, usuario_id, base_id);
        uow.insert_relation(&relation).await?;
        uow.commit().await?;

        debug!(
            kind = ?kind,
            usuario_id = %usuario_id,
            base_id = %base_id,
            relation_id = %relation.id,
            "Relation created"
        );
        Ok(relation.id)
    }

    /// Removes a relation; the base row goes with it when this was its last
    /// reference.
    pub async fn delete_relation(
        &self,
        kind: CatalogKind,
        relation_id: Uuid,
    ) -> Result<CascadeOutcome> {
        self.delete_with_cascade(kind, relation_id).await
    }

    // -------- Promotion / demotion --------

    /// Creates a new base row and binds it to `usuario_id` in one unit of
    /// work.
    pub async fn create_personal(
        &self,
        usuario_id: Uuid,
        fields: BaseFields,
    ) -> Result<PersonalCreated> {
        let fields = fields.normalized()?;
        let kind = fields.kind();

        let mut uow = self.store.begin().await?;
        require_user(uow.as_mut(), usuario_id).await?;

        let base = BaseRow::new(fields);
        uow.insert_base(&base).await?;
        let relation = RelationRow::new(kind, usuario_id, base.id);
        uow.insert_relation(&relation).await?;
        uow.commit().await?;

        info!(
            kind = ?kind,
            usuario_id = %usuario_id,
            base_id = %base.id,
            etiqueta = %base.label(),
            "Personalized item created"
        );
        Ok(PersonalCreated {
            base_id: base.id,
            relation_id: relation.id,
        })
    }

    /// Locks are always taken base first, the same order `delete_base` and
    /// `purge_reserved_label` use. The relation is read unlocked and checked
    /// again once the base lock is held.
    pub async fn delete_with_cascade(
        &self,
        kind: CatalogKind,
        relation_id: Uuid,
    ) -> Result<CascadeOutcome> {
        let mut uow = self.store.begin().await?;

        let relation = uow
            .find_relation(kind, relation_id)
            .await?
            .ok_or_else(|| relation_not_found(kind))?;
        let base = uow
            .lock_base(kind, relation.base_id)
            .await?
            .ok_or_else(|| relation_not_found(kind))?;
        let references = uow.count_relations(kind, base.id).await?;

        // A concurrent delete may have removed it while we waited on the base.
        if !uow.delete_relation(kind, relation.id).await? {
            return Err(relation_not_found(kind));
        }

        let base_eliminada = references == 1;
        if base_eliminada {
            uow.delete_base(kind, base.id).await?;
        }
        uow.commit().await?;

        info!(
            kind = ?kind,
            relation_id = %relation.id,
            base_id = %base.id,
            base_eliminada,
            "Relation deleted"
        );
        Ok(CascadeOutcome {
            relation_id: relation.id,
            base_id: base.id,
            etiqueta: base.label().to_string(),
            base_eliminada,
            referencias_restantes: references.saturating_sub(1),
        })
    }

    /// In-place update seen by every user sharing the base row.
    pub async fn modify_base(
        &self,
        kind: CatalogKind,
        base_id: Uuid,
        fields: BaseFields,
    ) -> Result<BaseRow> {
        let fields = fields.normalized()?;
        if fields.kind() != kind {
            return Err(DespachoError::bad_request(format!(
                "Los campos no corresponden a un {}",
                kind.noun()
            )));
        }

        let mut uow = self.store.begin().await?;
        uow.lock_base(kind, base_id)
            .await?
            .ok_or_else(|| base_not_found(kind))?;

        let row = BaseRow {
            id: base_id,
            fields,
        };
        uow.update_base(&row).await?;
        uow.commit().await?;

        info!(kind = ?kind, base_id = %base_id, "Base row updated");
        Ok(row)
    }

    /// Blanks `nota_avances` on a base template.
    pub async fn clear_avances(&self, base_id: Uuid) -> Result<BaseRow> {
        let kind = CatalogKind::Template;
        let mut uow = self.store.begin().await?;
        let mut row = uow
            .lock_base(kind, base_id)
            .await?
            .ok_or_else(|| base_not_found(kind))?;

        if let BaseFields::Template(fields) = &mut row.fields {
            fields.nota_avances = None;
        }
        uow.update_base(&row).await?;
        uow.commit().await?;
        Ok(row)
    }

    /// Every base row of `kind` except reserved-label templates. Templates are
    /// ordered by label; applicatives by category, then label.
    pub async fn list_available_bases(&self, kind: CatalogKind) -> Result<Vec<BaseRow>> {
        let mut uow = self.store.begin().await?;
        let mut rows: Vec<BaseRow> = uow
            .list_bases(kind)
            .await?
            .into_iter()
            .filter(|row| !row.is_reserved())
            .collect();

        rows.sort_by_cached_key(|row| match &row.fields {
            BaseFields::Template(fields) => (String::new(), fields.novedad.to_lowercase()),
            BaseFields::Applicative(fields) => {
                (fields.categoria.to_lowercase(), fields.nombre.to_lowercase())
            }
        });
        Ok(rows)
    }

    /// Deletes a base row and all of its relations.
    pub async fn delete_base(&self, kind: CatalogKind, base_id: Uuid) -> Result<BaseDeletion> {
        let mut uow = self.store.begin().await?;
        let base = uow
            .lock_base(kind, base_id)
            .await?
            .ok_or_else(|| base_not_found(kind))?;
        let deletion = remove_base(uow.as_mut(), &base).await?;
        uow.commit().await?;

        info!(
            kind = ?kind,
            base_id = %base_id,
            relaciones_eliminadas = deletion.relaciones_eliminadas,
            "Base row deleted with its relations"
        );
        Ok(deletion)
    }

    /// Removes every template carrying the reserved label, with its relations.
    pub async fn purge_reserved_label(&self) -> Result<PurgeReport> {
        let kind = CatalogKind::Template;
        let mut uow = self.store.begin().await?;
        uow.lock_catalog(kind).await?;

        let reserved: Vec<BaseRow> = uow
            .list_bases(kind)
            .await?
            .into_iter()
            .filter(BaseRow::is_reserved)
            .collect();

        let mut report = PurgeReport::default();
        for candidate in &reserved {
            let Some(base) = uow.lock_base(kind, candidate.id).await? else {
                continue;
            };
            let deletion = remove_base(uow.as_mut(), &base).await?;
            warn!(
                base_id = %deletion.base_id,
                etiqueta = %deletion.etiqueta,
                usuarios_afectados = deletion.usuarios_afectados.len(),
                "Reserved-label template purged"
            );
            report.detalle.push(deletion);
        }
        uow.commit().await?;

        report.eliminadas = report.detalle.len();
        info!(
            eliminadas = report.eliminadas,
            usuarios_afectados = report.usuarios_afectados(),
            "Reserved-label purge finished"
        );
        Ok(report)
    }

    // -------- Ownership queries used by the authorization policy --------

    pub async fn holds_base(
        &self,
        kind: CatalogKind,
        usuario_id: Uuid,
        base_id: Uuid,
    ) -> Result<bool> {
        let mut uow = self.store.begin().await?;
        uow.relation_exists(kind, usuario_id, base_id).await
    }

    pub async fn relation_owner(&self, kind: CatalogKind, relation_id: Uuid) -> Result<Option<Uuid>> {
        let mut uow = self.store.begin().await?;
        Ok(uow
            .find_relation(kind, relation_id)
            .await?
            .map(|relation| relation.usuario_id))
    }
}

async fn require_user(uow: &mut dyn UnitOfWork, usuario_id: Uuid) -> Result<()> {
    match uow.find_user(usuario_id).await? {
        Some(_) => Ok(()),
        None => Err(DespachoError::NotFound("Usuario no encontrado".to_string())),
    }
}

async fn remove_base(uow: &mut dyn UnitOfWork, base: &BaseRow) -> Result<BaseDeletion> {
    let kind = base.kind();
    let usuarios_afectados = uow.relation_users(kind, base.id).await?;
    let relaciones_eliminadas = uow.delete_relations_for_base(kind, base.id).await?;
    uow.delete_base(kind, base.id).await?;

    Ok(BaseDeletion {
        base_id: base.id,
        etiqueta: base.label().to_string(),
        relaciones_eliminadas,
        usuarios_afectados,
    })
}

fn relation_not_found(kind: CatalogKind) -> DespachoError {
    DespachoError::NotFound(format!(
        "{} no encontrada",
        capitalize(kind.relation_noun())
    ))
}

fn base_not_found(kind: CatalogKind) -> DespachoError {
    DespachoError::NotFound(format!("{} base no encontrada", capitalize(kind.noun())))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApplicativeFields, TemplateFields, UserRecord};
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;
    use std::sync::Arc;

    fn template(novedad: &str, plantilla: &str) -> BaseFields {
        BaseFields::Template(TemplateFields {
            novedad: novedad.to_string(),
            plantilla: Some(plantilla.to_string()),
            ..Default::default()
        })
    }

    async fn setup() -> (LifecycleManager, MemoryStore) {
        let store = MemoryStore::new();
        (LifecycleManager::new(Arc::new(store.clone())), store)
    }

    async fn add_user(store: &MemoryStore, email: &str) -> Uuid {
        let user = UserRecord {
            id: Uuid::new_v4(),
            nombre: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            creado_en: Utc::now(),
        };
        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&user).await.unwrap();
        uow.commit().await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn create_relation_rejects_unknown_user_and_base() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;
        let created = manager
            .create_personal(ana, template("Sin servicio", "Cliente reporta..."))
            .await
            .unwrap();

        let err = manager
            .create_relation(CatalogKind::Template, Uuid::new_v4(), created.base_id)
            .await
            .unwrap_err();
        assert!(matches!(err, DespachoError::NotFound(_)));

        let err = manager
            .create_relation(CatalogKind::Template, ana, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DespachoError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_personal_for_unknown_user_leaves_no_base() {
        let (manager, store) = setup().await;
        let err = manager
            .create_personal(Uuid::new_v4(), template("Reporte X", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, DespachoError::NotFound(_)));
        assert_eq!(store.stats().await.template_bases, 0);
    }

    #[tokio::test]
    async fn delete_reports_remaining_references() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;
        let beto = add_user(&store, "beto@despacho.co").await;

        let created = manager
            .create_personal(ana, template("Reporte X", "cuerpo"))
            .await
            .unwrap();
        manager
            .create_relation(CatalogKind::Template, beto, created.base_id)
            .await
            .unwrap();

        let outcome = manager
            .delete_relation(CatalogKind::Template, created.relation_id)
            .await
            .unwrap();
        assert!(!outcome.base_eliminada);
        assert_eq!(outcome.referencias_restantes, 1);
        assert_eq!(outcome.etiqueta, "Reporte X");
    }

    #[tokio::test]
    async fn deleting_missing_relation_is_not_found() {
        let (manager, _store) = setup().await;
        let err = manager
            .delete_relation(CatalogKind::Applicative, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DespachoError::NotFound(_)));
    }

    #[tokio::test]
    async fn modify_base_is_visible_to_every_holder() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;
        let beto = add_user(&store, "beto@despacho.co").await;

        let created = manager
            .create_personal(ana, template("Reporte X", "v1"))
            .await
            .unwrap();
        manager
            .create_relation(CatalogKind::Template, beto, created.base_id)
            .await
            .unwrap();

        manager
            .modify_base(
                CatalogKind::Template,
                created.base_id,
                template("Reporte X", "v2"),
            )
            .await
            .unwrap();

        for user in [ana, beto] {
            let notes = manager
                .list_relations(CatalogKind::Template, user)
                .await
                .unwrap();
            match &notes[0].fields {
                BaseFields::Template(fields) => {
                    assert_eq!(fields.plantilla.as_deref(), Some("v2"))
                }
                _ => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn modify_base_rejects_unknown_row_and_wrong_family() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;
        let created = manager
            .create_personal(ana, template("Reporte X", "v1"))
            .await
            .unwrap();

        let err = manager
            .modify_base(CatalogKind::Template, Uuid::new_v4(), template("Otro", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, DespachoError::NotFound(_)));

        let app = BaseFields::Applicative(ApplicativeFields {
            nombre: "CRM".into(),
            url: "https://crm.example.com".into(),
            categoria: "Ventas".into(),
        });
        let err = manager
            .modify_base(CatalogKind::Template, created.base_id, app)
            .await
            .unwrap_err();
        assert!(matches!(err, DespachoError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn avances_listing_and_clearing() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;

        let with_avances = manager
            .create_personal(
                ana,
                BaseFields::Template(TemplateFields {
                    novedad: "Seguimiento".into(),
                    nota_avances: Some("Se escaló a nivel 2".into()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        manager
            .create_personal(
                ana,
                BaseFields::Template(TemplateFields {
                    novedad: "Sin servicio".into(),
                    nota_avances: Some("   ".into()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let avances = manager.list_avances(ana).await.unwrap();
        assert_eq!(avances.len(), 1);
        assert_eq!(avances[0].base_id, with_avances.base_id);

        manager.clear_avances(with_avances.base_id).await.unwrap();
        assert!(manager.list_avances(ana).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn applicatives_are_ordered_by_category_then_name() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;
        for (nombre, categoria) in [("Zeta", "Ventas"), ("Alfa", "Soporte"), ("Beta", "Ventas")] {
            manager
                .create_personal(
                    ana,
                    BaseFields::Applicative(ApplicativeFields {
                        nombre: nombre.into(),
                        url: format!("https://{}.example.com", nombre.to_lowercase()),
                        categoria: categoria.into(),
                    }),
                )
                .await
                .unwrap();
        }

        let names: Vec<String> = manager
            .list_available_bases(CatalogKind::Applicative)
            .await
            .unwrap()
            .iter()
            .map(|row| row.label().to_string())
            .collect();
        assert_eq!(names, vec!["Alfa", "Beta", "Zeta"]);
    }

    #[tokio::test]
    async fn delete_base_reports_affected_users() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;
        let beto = add_user(&store, "beto@despacho.co").await;
        let created = manager
            .create_personal(ana, template("Reporte X", ""))
            .await
            .unwrap();
        manager
            .create_relation(CatalogKind::Template, beto, created.base_id)
            .await
            .unwrap();

        let deletion = manager
            .delete_base(CatalogKind::Template, created.base_id)
            .await
            .unwrap();
        assert_eq!(deletion.relaciones_eliminadas, 2);
        assert_eq!(deletion.usuarios_afectados.len(), 2);

        let stats = store.stats().await;
        assert_eq!(stats.template_bases, 0);
        assert_eq!(stats.template_relations, 0);
    }

    #[tokio::test]
    async fn ownership_queries() {
        let (manager, store) = setup().await;
        let ana = add_user(&store, "ana@despacho.co").await;
        let beto = add_user(&store, "beto@despacho.co").await;
        let created = manager
            .create_personal(ana, template("Reporte X", ""))
            .await
            .unwrap();

        assert!(manager
            .holds_base(CatalogKind::Template, ana, created.base_id)
            .await
            .unwrap());
        assert!(!manager
            .holds_base(CatalogKind::Template, beto, created.base_id)
            .await
            .unwrap());
        assert_eq!(
            manager
                .relation_owner(CatalogKind::Template, created.relation_id)
                .await
                .unwrap(),
            Some(ana)
        );
    }
}
