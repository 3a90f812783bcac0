use crate::{
    admin_handlers, aplicativo_handlers, auth, auth_handlers, handlers, nota_handlers, AppState,
};
use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

// Clients send the non-ASCII segment percent-encoded; the ASCII spelling is
// accepted as well.
const CAMBIAR_CONTRASENA: [&str; 2] = [
    "/api/auth/cambiar-contrase%C3%B1a",
    "/api/auth/cambiar-contrasena",
];
const RECUPERAR_CONTRASENA: [&str; 2] = [
    "/api/auth/recuperar-contrase%C3%B1a",
    "/api/auth/recuperar-contrasena",
];

pub fn create_router(state: AppState) -> Router {
    let mut public: Router<AppState> = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/registro", post(auth_handlers::registro))
        .route("/api/auth/login", post(auth_handlers::login));
    for path in RECUPERAR_CONTRASENA {
        public = public.route(path, put(auth_handlers::recuperar_contrasena));
    }

    let mut protected: Router<AppState> = Router::new()
        // Notas
        .route("/api/notas", post(nota_handlers::crear_nota))
        .route("/api/notas/asignar", post(nota_handlers::asignar_plantilla))
        .route(
            "/api/notas/plantillas-disponibles",
            get(nota_handlers::plantillas_disponibles),
        )
        .route(
            "/api/notas/avances/{usuario_id}",
            get(nota_handlers::obtener_notas_avances),
        )
        .route(
            "/api/notas/plantilla/{id}",
            put(nota_handlers::modificar_plantilla).delete(nota_handlers::eliminar_plantilla),
        )
        .route(
            "/api/notas/limpiar-avances/{id}",
            patch(nota_handlers::limpiar_avances),
        )
        // GET takes a user id, DELETE a note id
        .route(
            "/api/notas/{id}",
            get(nota_handlers::obtener_notas).delete(nota_handlers::eliminar_nota),
        )
        // Aplicativos
        .route(
            "/api/aplicativos",
            get(aplicativo_handlers::obtener_aplicativos)
                .post(aplicativo_handlers::agregar_aplicativo),
        )
        .route(
            "/api/aplicativos/disponibles",
            get(aplicativo_handlers::aplicativos_disponibles),
        )
        .route(
            "/api/aplicativos/asignar",
            post(aplicativo_handlers::asignar_aplicativo),
        )
        .route(
            "/api/aplicativos/base/{id}",
            put(aplicativo_handlers::modificar_aplicativo_base)
                .delete(aplicativo_handlers::eliminar_aplicativo_base),
        )
        .route(
            "/api/aplicativos/{id}",
            delete(aplicativo_handlers::eliminar_aplicativo),
        )
        // Admin
        .route(
            "/api/admin/usuarios/{usuario_id}/sembrar",
            post(admin_handlers::sembrar_usuario),
        )
        .route(
            "/api/admin/purgar-avance",
            post(admin_handlers::purgar_avance),
        );
    for path in CAMBIAR_CONTRASENA {
        protected = protected.route(path, put(auth_handlers::cambiar_contrasena));
    }
    let protected = protected.route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::auth_middleware,
    ));

    let cors = cors_layer(&state.settings.security.allowed_origins);

    public
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
