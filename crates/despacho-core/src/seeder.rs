//! Default catalog content and per-user seeding.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DespachoError, Result};
use crate::model::{
    ApplicativeFields, BaseFields, BaseRow, CatalogKind, RelationRow, SeedReport, TemplateFields,
};
use crate::store::{SharedStore, UnitOfWork};

struct SeedTemplate {
    novedad: &'static str,
    nota_publica: &'static str,
    nota_interna: &'static str,
    plantilla: &'static str,
}

const DEFAULT_TEMPLATES: &[SeedTemplate] = &[
    SeedTemplate {
        novedad: "Sin servicio",
        nota_publica: "Se recibe reporte de cliente sin servicio. Se inicia diagnóstico.",
        nota_interna: "Validar estado del enlace y alarmas en el NOC.",
        plantilla: "Cliente reporta ausencia total de servicio desde: \nSede: \nContacto: ",
    },
    SeedTemplate {
        novedad: "Intermitencia",
        nota_publica: "Se registra intermitencia en el servicio. Se realiza seguimiento.",
        nota_interna: "Revisar pérdidas de paquetes y latencia en el último tramo.",
        plantilla: "Cliente reporta intermitencia en horario: \nFrecuencia: \nContacto: ",
    },
    SeedTemplate {
        novedad: "Lentitud",
        nota_publica: "Se reporta lentitud en la navegación. Se validan consumos.",
        nota_interna: "Verificar ancho de banda contratado contra el medido.",
        plantilla: "Cliente reporta lentitud. Velocidad contratada: \nVelocidad medida: ",
    },
    SeedTemplate {
        novedad: "Cambio de equipo",
        nota_publica: "Se programa cambio de equipo en sitio.",
        nota_interna: "Confirmar disponibilidad de inventario y serial del equipo retirado.",
        plantilla: "Equipo a retirar: \nEquipo a instalar: \nFecha programada: ",
    },
    SeedTemplate {
        novedad: "Visita técnica",
        nota_publica: "Se agenda visita técnica con el cliente.",
        nota_interna: "Asignar cuadrilla y validar permisos de acceso a la sede.",
        plantilla: "Dirección: \nFranja horaria: \nContacto en sitio: ",
    },
];

struct SeedApplicative {
    nombre: &'static str,
    url: &'static str,
    categoria: &'static str,
}

const DEFAULT_APPLICATIVES: &[SeedApplicative] = &[
    SeedApplicative {
        nombre: "Correo corporativo",
        url: "https://outlook.office.com",
        categoria: "Comunicación",
    },
    SeedApplicative {
        nombre: "Teams",
        url: "https://teams.microsoft.com",
        categoria: "Comunicación",
    },
    SeedApplicative {
        nombre: "Mesa de ayuda",
        url: "https://soporte.example.com",
        categoria: "Gestión",
    },
    SeedApplicative {
        nombre: "Monitoreo de red",
        url: "https://monitoreo.example.com",
        categoria: "Operación",
    },
];

fn default_rows(kind: CatalogKind) -> Vec<BaseRow> {
    match kind {
        CatalogKind::Template => DEFAULT_TEMPLATES
            .iter()
            .map(|seed| {
                BaseRow::new(BaseFields::Template(TemplateFields {
                    novedad: seed.novedad.to_string(),
                    nota_publica: Some(seed.nota_publica.to_string()),
                    nota_interna: Some(seed.nota_interna.to_string()),
                    nota_avances: None,
                    plantilla: Some(seed.plantilla.to_string()),
                }))
            })
            .collect(),
        CatalogKind::Applicative => DEFAULT_APPLICATIVES
            .iter()
            .map(|seed| {
                BaseRow::new(BaseFields::Applicative(ApplicativeFields {
                    nombre: seed.nombre.to_string(),
                    url: seed.url.to_string(),
                    categoria: seed.categoria.to_string(),
                }))
            })
            .collect(),
    }
}

/// Number of rows the built-in seed list creates for `kind`.
pub fn default_count(kind: CatalogKind) -> usize {
    match kind {
        CatalogKind::Template => DEFAULT_TEMPLATES.len(),
        CatalogKind::Applicative => DEFAULT_APPLICATIVES.len(),
    }
}

pub struct DefaultContentSeeder {
    store: SharedStore,
}

impl DefaultContentSeeder {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Inserts the default templates when the catalog is empty. Returns the
    /// number of rows created.
    pub async fn ensure_default_templates_exist(&self) -> Result<usize> {
        self.ensure_defaults(CatalogKind::Template).await
    }

    pub async fn ensure_default_applicatives_exist(&self) -> Result<usize> {
        self.ensure_defaults(CatalogKind::Applicative).await
    }

    async fn ensure_defaults(&self, kind: CatalogKind) -> Result<usize> {
        let mut uow = self.store.begin().await?;
        let created = ensure_in(uow.as_mut(), kind).await?;
        uow.commit().await?;
        Ok(created)
    }

    /// Makes sure the catalog is populated and links every base row to the
    /// user. Pairs that already exist are left alone, so this doubles as a
    /// repair operation for existing accounts.
    pub async fn seed_user_defaults(&self, usuario_id: Uuid) -> Result<SeedReport> {
        let mut uow = self.store.begin().await?;
        if uow.find_user(usuario_id).await?.is_none() {
            return Err(DespachoError::NotFound("Usuario no encontrado".to_string()));
        }

        let mut report = SeedReport {
            plantillas_creadas: ensure_in(uow.as_mut(), CatalogKind::Template).await?,
            aplicativos_creados: ensure_in(uow.as_mut(), CatalogKind::Applicative).await?,
            ..Default::default()
        };
        report.plantillas_vinculadas =
            link_all(uow.as_mut(), CatalogKind::Template, usuario_id).await?;
        report.aplicativos_vinculados =
            link_all(uow.as_mut(), CatalogKind::Applicative, usuario_id).await?;
        uow.commit().await?;

        info!(
            usuario_id = %usuario_id,
            plantillas = report.plantillas_vinculadas,
            aplicativos = report.aplicativos_vinculados,
            "User defaults seeded"
        );
        Ok(report)
    }
}

async fn ensure_in(uow: &mut dyn UnitOfWork, kind: CatalogKind) -> Result<usize> {
    uow.lock_catalog(kind).await?;
    if uow.count_bases(kind).await? > 0 {
        return Ok(0);
    }

    let rows = default_rows(kind);
    for row in &rows {
        uow.insert_base(row).await?;
    }
    info!(kind = ?kind, created = rows.len(), "Default catalog created");
    Ok(rows.len())
}

async fn link_all(uow: &mut dyn UnitOfWork, kind: CatalogKind, usuario_id: Uuid) -> Result<usize> {
    let mut linked = 0;
    for base in uow.list_bases(kind).await? {
        if base.is_reserved() || uow.relation_exists(kind, usuario_id, base.id).await? {
            continue;
        }
        uow.insert_relation(&RelationRow::new(kind, usuario_id, base.id))
            .await?;
        linked += 1;
    }
    debug!(kind = ?kind, usuario_id = %usuario_id, linked, "Relations linked");
    Ok(linked)
}
