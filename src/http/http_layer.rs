// HTTP layer - axum router and handlers over the core services.

#[path = "router.rs"]
pub mod router;

#[path = "responses.rs"]
pub mod responses;

#[path = "migration_routes.rs"]
pub mod migration_routes;

#[path = "document_routes.rs"]
pub mod document_routes;

#[path = "storage_routes.rs"]
pub mod storage_routes;

#[path = "status_page.rs"]
pub mod status_page;

pub use router::{build_router, serve, AppState, HttpSettings};
