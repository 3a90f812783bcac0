//! Records shared by the store, the lifecycle manager and the HTTP layer.
//!
//! Templates and applicatives are two families with the same sharing shape:
//! a base row that any number of users can reference, and a per-user
//! relation row. [`CatalogKind`] selects the family; [`BaseFields`] carries
//! the family-specific payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DespachoError, Result};

/// Template label kept for the avances quick-note feature. Never stored as a
/// regular template.
pub const RESERVED_TEMPLATE_LABEL: &str = "avance";

/// Labels offered to the user when the reserved one is rejected.
pub const RESERVED_LABEL_SUGGESTIONS: &[&str] =
    &["Nota de avance", "Avance de gestión", "Seguimiento"];

pub fn is_reserved_label(label: &str) -> bool {
    label.trim().to_lowercase() == RESERVED_TEMPLATE_LABEL
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Template,
    Applicative,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 2] = [CatalogKind::Template, CatalogKind::Applicative];

    pub fn base_table(self) -> &'static str {
        match self {
            CatalogKind::Template => "plantillas_base",
            CatalogKind::Applicative => "aplicativos_base",
        }
    }

    pub fn relation_table(self) -> &'static str {
        match self {
            CatalogKind::Template => "notas_despacho_rel",
            CatalogKind::Applicative => "aplicativos_rel",
        }
    }

    pub fn relation_fk(self) -> &'static str {
        match self {
            CatalogKind::Template => "plantilla_id",
            CatalogKind::Applicative => "aplicativo_base_id",
        }
    }

    /// Noun used in user-facing messages.
    pub fn noun(self) -> &'static str {
        match self {
            CatalogKind::Template => "plantilla",
            CatalogKind::Applicative => "aplicativo",
        }
    }

    /// What the UI calls a relation of this family.
    pub fn relation_noun(self) -> &'static str {
        match self {
            CatalogKind::Template => "nota",
            CatalogKind::Applicative => "aplicativo",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFields {
    #[serde(default)]
    pub novedad: String,
    #[serde(default)]
    pub nota_publica: Option<String>,
    #[serde(default)]
    pub nota_interna: Option<String>,
    #[serde(default)]
    pub nota_avances: Option<String>,
    #[serde(default)]
    pub plantilla: Option<String>,
}

impl TemplateFields {
    pub fn new(novedad: impl Into<String>) -> Self {
        Self {
            novedad: novedad.into(),
            ..Default::default()
        }
    }

    pub fn has_avances(&self) -> bool {
        self.nota_avances
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicativeFields {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub categoria: String,
}

pub const DEFAULT_APPLICATIVE_CATEGORY: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BaseFields {
    Template(TemplateFields),
    Applicative(ApplicativeFields),
}

impl BaseFields {
    pub fn kind(&self) -> CatalogKind {
        match self {
            BaseFields::Template(_) => CatalogKind::Template,
            BaseFields::Applicative(_) => CatalogKind::Applicative,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            BaseFields::Template(fields) => &fields.novedad,
            BaseFields::Applicative(fields) => &fields.nombre,
        }
    }

    /// Trims labels, fills the default category and rejects missing required
    /// fields or the reserved template label.
    pub fn normalized(self) -> Result<Self> {
        match self {
            BaseFields::Template(mut fields) => {
                fields.novedad = fields.novedad.trim().to_string();
                if fields.novedad.is_empty() {
                    return Err(DespachoError::bad_request("El campo novedad es obligatorio"));
                }
                if is_reserved_label(&fields.novedad) {
                    return Err(DespachoError::BadRequest {
                        mensaje: format!(
                            "La novedad \"{}\" está reservada para las notas de avances",
                            fields.novedad
                        ),
                        sugerencias: RESERVED_LABEL_SUGGESTIONS
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    });
                }
                Ok(BaseFields::Template(fields))
            }
            BaseFields::Applicative(mut fields) => {
                fields.nombre = fields.nombre.trim().to_string();
                fields.url = fields.url.trim().to_string();
                fields.categoria = fields.categoria.trim().to_string();
                if fields.nombre.is_empty() {
                    return Err(DespachoError::bad_request("El campo nombre es obligatorio"));
                }
                if fields.url.is_empty() {
                    return Err(DespachoError::bad_request("El campo url es obligatorio"));
                }
                if fields.categoria.is_empty() {
                    fields.categoria = DEFAULT_APPLICATIVE_CATEGORY.to_string();
                }
                Ok(BaseFields::Applicative(fields))
            }
        }
    }
}

impl From<TemplateFields> for BaseFields {
    fn from(fields: TemplateFields) -> Self {
        BaseFields::Template(fields)
    }
}

impl From<ApplicativeFields> for BaseFields {
    fn from(fields: ApplicativeFields) -> Self {
        BaseFields::Applicative(fields)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseRow {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: BaseFields,
}

impl BaseRow {
    pub fn new(fields: BaseFields) -> Self {
        Self {
            id: Uuid::new_v4(),
            fields,
        }
    }

    pub fn kind(&self) -> CatalogKind {
        self.fields.kind()
    }

    pub fn label(&self) -> &str {
        self.fields.label()
    }

    pub fn is_reserved(&self) -> bool {
        self.kind() == CatalogKind::Template && is_reserved_label(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRow {
    pub id: Uuid,
    pub kind: CatalogKind,
    pub usuario_id: Uuid,
    pub base_id: Uuid,
    pub creado_en: DateTime<Utc>,
}

impl RelationRow {
    pub fn new(kind: CatalogKind, usuario_id: Uuid, base_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            usuario_id,
            base_id,
            creado_en: Utc::now(),
        }
    }
}

/// A relation joined with its base row: what the UI lists as a note or a
/// shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationView {
    pub id: Uuid,
    pub base_id: Uuid,
    #[serde(flatten)]
    pub fields: BaseFields,
    pub creado_en: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub nombre: String,
    pub email: String,
    pub password_hash: String,
    pub creado_en: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub nombre: String,
    pub email: String,
}

impl From<&UserRecord> for PublicUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            nombre: user.nombre.clone(),
            email: user.email.clone(),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalCreated {
    pub base_id: Uuid,
    pub relation_id: Uuid,
}

/// Result of removing a relation: whether the base row went with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeOutcome {
    pub relation_id: Uuid,
    pub base_id: Uuid,
    pub etiqueta: String,
    pub base_eliminada: bool,
    pub referencias_restantes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseDeletion {
    pub base_id: Uuid,
    pub etiqueta: String,
    pub relaciones_eliminadas: u64,
    pub usuarios_afectados: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub eliminadas: usize,
    pub detalle: Vec<BaseDeletion>,
}

impl PurgeReport {
    pub fn usuarios_afectados(&self) -> usize {
        let mut users: Vec<Uuid> = self
            .detalle
            .iter()
            .flat_map(|d| d.usuarios_afectados.iter().copied())
            .collect();
        users.sort();
        users.dedup();
        users.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub plantillas_creadas: usize,
    pub aplicativos_creados: usize,
    pub plantillas_vinculadas: usize,
    pub aplicativos_vinculados: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_label_ignores_case_and_padding() {
        assert!(is_reserved_label("avance"));
        assert!(is_reserved_label("AVANCE"));
        assert!(is_reserved_label("  Avance "));
        assert!(!is_reserved_label("Avances"));
        assert!(!is_reserved_label("Nota de avance"));
    }

    #[test]
    fn reserved_template_label_carries_suggestions() {
        let err = BaseFields::from(TemplateFields::new("Avance"))
            .normalized()
            .unwrap_err();
        match err {
            DespachoError::BadRequest { sugerencias, .. } => {
                assert_eq!(sugerencias.len(), RESERVED_LABEL_SUGGESTIONS.len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn applicative_gets_default_category() {
        let fields = BaseFields::from(ApplicativeFields {
            nombre: " CRM ".into(),
            url: "https://crm.example.com".into(),
            categoria: "  ".into(),
        })
        .normalized()
        .unwrap();

        match fields {
            BaseFields::Applicative(app) => {
                assert_eq!(app.nombre, "CRM");
                assert_eq!(app.categoria, DEFAULT_APPLICATIVE_CATEGORY);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn applicative_requires_url() {
        let err = BaseFields::from(ApplicativeFields {
            nombre: "CRM".into(),
            url: String::new(),
            categoria: String::new(),
        })
        .normalized()
        .unwrap_err();
        assert!(matches!(err, DespachoError::BadRequest { .. }));
    }

    #[test]
    fn relation_view_flattens_base_fields() {
        let view = RelationView {
            id: Uuid::nil(),
            base_id: Uuid::nil(),
            fields: TemplateFields::new("Sin servicio").into(),
            creado_en: Utc::now(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["novedad"], "Sin servicio");
        assert!(json.get("creado_en").is_some());
    }
}
