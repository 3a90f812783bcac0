use std::sync::Arc;

use chrono::Utc;
use despacho_core::seeder::default_count;
use despacho_core::{
    BaseFields, CatalogKind, DefaultContentSeeder, DespachoError, LifecycleManager, MemoryStore,
    SharedStore, Store, TemplateFields, UserRecord,
};
use uuid::Uuid;

struct Harness {
    store: MemoryStore,
    lifecycle: LifecycleManager,
    seeder: DefaultContentSeeder,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        let shared: SharedStore = Arc::new(store.clone());
        Self {
            lifecycle: LifecycleManager::new(shared.clone()),
            seeder: DefaultContentSeeder::new(shared),
            store,
        }
    }

    async fn user(&self, nombre: &str) -> Uuid {
        let user = UserRecord {
            id: Uuid::new_v4(),
            nombre: nombre.to_string(),
            email: format!("{}@despacho.co", nombre.to_lowercase()),
            password_hash: "hash".to_string(),
            creado_en: Utc::now(),
        };
        let mut uow = self.store.begin().await.unwrap();
        uow.insert_user(&user).await.unwrap();
        uow.commit().await.unwrap();
        user.id
    }
}

fn note(novedad: &str) -> BaseFields {
    BaseFields::Template(TemplateFields {
        novedad: novedad.to_string(),
        nota_publica: Some("Se informa al cliente".to_string()),
        plantilla: Some("Detalle:".to_string()),
        ..Default::default()
    })
}

#[tokio::test]
async fn personal_item_is_removed_with_its_only_relation() {
    let h = Harness::new();
    let ana = h.user("Ana").await;

    let created = h.lifecycle.create_personal(ana, note("Reporte X")).await.unwrap();
    let stats = h.store.stats().await;
    assert_eq!(stats.template_bases, 1);
    assert_eq!(stats.template_relations, 1);

    let outcome = h
        .lifecycle
        .delete_relation(CatalogKind::Template, created.relation_id)
        .await
        .unwrap();
    assert!(outcome.base_eliminada);
    assert_eq!(outcome.referencias_restantes, 0);

    let stats = h.store.stats().await;
    assert_eq!(stats.template_bases, 0);
    assert_eq!(stats.template_relations, 0);
}

#[tokio::test]
async fn shared_base_survives_until_last_holder_leaves() {
    let h = Harness::new();
    let ana = h.user("Ana").await;
    let beto = h.user("Beto").await;

    let created = h.lifecycle.create_personal(ana, note("Reporte X")).await.unwrap();
    let beto_relation = h
        .lifecycle
        .create_relation(CatalogKind::Template, beto, created.base_id)
        .await
        .unwrap();

    let stats = h.store.stats().await;
    assert_eq!(stats.template_bases, 1);
    assert_eq!(stats.template_relations, 2);

    h.lifecycle
        .delete_relation(CatalogKind::Template, created.relation_id)
        .await
        .unwrap();
    let remaining = h
        .lifecycle
        .list_relations(CatalogKind::Template, beto)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].base_id, created.base_id);
    assert!(h
        .lifecycle
        .list_relations(CatalogKind::Template, ana)
        .await
        .unwrap()
        .is_empty());

    let outcome = h
        .lifecycle
        .delete_relation(CatalogKind::Template, beto_relation)
        .await
        .unwrap();
    assert!(outcome.base_eliminada);

    let available = h
        .lifecycle
        .list_available_bases(CatalogKind::Template)
        .await
        .unwrap();
    assert!(available.iter().all(|row| row.id != created.base_id));
    assert_eq!(h.store.stats().await.template_bases, 0);
}

#[tokio::test]
async fn ensure_defaults_twice_matches_once() {
    let h = Harness::new();
    h.seeder.ensure_default_templates_exist().await.unwrap();
    let once = h.store.stats().await.template_bases;
    h.seeder.ensure_default_templates_exist().await.unwrap();
    assert_eq!(h.store.stats().await.template_bases, once);
    assert_eq!(once, default_count(CatalogKind::Template));
}

#[tokio::test]
async fn reserved_label_is_rejected_in_every_casing() {
    let h = Harness::new();
    let ana = h.user("Ana").await;

    for label in ["AVANCE", "avance", "Avance", "  avance  "] {
        let err = h.lifecycle.create_personal(ana, note(label)).await.unwrap_err();
        match err {
            DespachoError::BadRequest { sugerencias, .. } => assert!(!sugerencias.is_empty()),
            other => panic!("unexpected error for {label:?}: {other:?}"),
        }
    }
    assert_eq!(h.store.stats().await.template_bases, 0);
}

#[tokio::test]
async fn legacy_reserved_rows_are_hidden_from_available_listing() {
    let h = Harness::new();
    h.seeder.ensure_default_templates_exist().await.unwrap();

    let legacy = despacho_core::BaseRow::new(BaseFields::Template(TemplateFields::new("Avance")));
    let mut uow = h.store.begin().await.unwrap();
    uow.insert_base(&legacy).await.unwrap();
    uow.commit().await.unwrap();

    let available = h
        .lifecycle
        .list_available_bases(CatalogKind::Template)
        .await
        .unwrap();
    assert_eq!(available.len(), default_count(CatalogKind::Template));
    assert!(available.iter().all(|row| !row.is_reserved()));

    let report = h.lifecycle.purge_reserved_label().await.unwrap();
    assert_eq!(report.eliminadas, 1);
    assert_eq!(
        h.store.stats().await.template_bases,
        default_count(CatalogKind::Template)
    );
}

#[tokio::test]
async fn assigning_same_pair_twice_conflicts() {
    let h = Harness::new();
    let ana = h.user("Ana").await;
    let beto = h.user("Beto").await;
    let created = h.lifecycle.create_personal(ana, note("Reporte X")).await.unwrap();

    h.lifecycle
        .create_relation(CatalogKind::Template, beto, created.base_id)
        .await
        .unwrap();
    let err = h
        .lifecycle
        .create_relation(CatalogKind::Template, beto, created.base_id)
        .await
        .unwrap_err();
    assert!(matches!(err, DespachoError::Conflict(_)));

    let beto_notes = h
        .lifecycle
        .list_relations(CatalogKind::Template, beto)
        .await
        .unwrap();
    assert_eq!(beto_notes.len(), 1);
}

#[tokio::test]
async fn second_registration_reuses_existing_defaults() {
    let h = Harness::new();
    let first = h.user("Ana").await;
    let second = h.user("Beto").await;

    h.seeder.seed_user_defaults(first).await.unwrap();
    let bases_before = h.store.stats().await;

    let report = h.seeder.seed_user_defaults(second).await.unwrap();
    assert_eq!(report.plantillas_creadas, 0);
    assert_eq!(report.aplicativos_creados, 0);
    assert_eq!(report.plantillas_vinculadas, default_count(CatalogKind::Template));
    assert_eq!(
        report.aplicativos_vinculados,
        default_count(CatalogKind::Applicative)
    );

    let after = h.store.stats().await;
    assert_eq!(after.template_bases, bases_before.template_bases);
    assert_eq!(after.applicative_bases, bases_before.applicative_bases);
    assert_eq!(
        h.lifecycle
            .list_relations(CatalogKind::Applicative, second)
            .await
            .unwrap()
            .len(),
        default_count(CatalogKind::Applicative)
    );
}

#[tokio::test]
async fn concurrent_deletes_of_shared_base_remove_it_exactly_once() {
    let h = Harness::new();
    let ana = h.user("Ana").await;
    let beto = h.user("Beto").await;
    let created = h.lifecycle.create_personal(ana, note("Reporte X")).await.unwrap();
    let beto_relation = h
        .lifecycle
        .create_relation(CatalogKind::Template, beto, created.base_id)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.lifecycle
            .delete_relation(CatalogKind::Template, created.relation_id),
        h.lifecycle.delete_relation(CatalogKind::Template, beto_relation),
    );
    let removed = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|outcome| outcome.base_eliminada)
        .count();

    assert_eq!(removed, 1);
    assert_eq!(h.store.stats().await.template_bases, 0);
}

#[tokio::test]
async fn cascade_delete_racing_base_delete_leaves_nothing_behind() {
    let h = Harness::new();
    let ana = h.user("Ana").await;
    let beto = h.user("Beto").await;
    let created = h.lifecycle.create_personal(ana, note("Reporte X")).await.unwrap();
    h.lifecycle
        .create_relation(CatalogKind::Template, beto, created.base_id)
        .await
        .unwrap();

    let (cascade, base) = tokio::join!(
        h.lifecycle
            .delete_relation(CatalogKind::Template, created.relation_id),
        h.lifecycle.delete_base(CatalogKind::Template, created.base_id),
    );

    // Whichever runs second finds its target gone; neither fails otherwise.
    match (cascade, base) {
        (Ok(outcome), Ok(deletion)) => {
            assert!(!outcome.base_eliminada);
            assert_eq!(deletion.relaciones_eliminadas, 1);
        }
        (Err(DespachoError::NotFound(_)), Ok(deletion)) => {
            assert_eq!(deletion.relaciones_eliminadas, 2);
        }
        other => panic!("unexpected results: {other:?}"),
    }
    let stats = h.store.stats().await;
    assert_eq!(stats.template_bases, 0);
    assert_eq!(stats.template_relations, 0);
}
