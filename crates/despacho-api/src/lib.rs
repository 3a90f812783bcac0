pub mod admin_handlers;
pub mod aplicativo_handlers;
pub mod auth;
pub mod auth_handlers;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod nota_handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use error::*;
pub use handlers::*;
pub use routes::*;
pub use server::*;
pub use state::*;
