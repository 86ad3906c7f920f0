pub mod audio_row_store;
pub mod tarea_store;

pub use audio_row_store::PgAudioRowStore;
pub use tarea_store::PgTareaStore;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Builds the shared pool. Connections are opened on first use, so commands
/// that never touch the database start without it.
pub fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_lazy(database_url)
}
