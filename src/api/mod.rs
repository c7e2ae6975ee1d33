pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

pub use routes::create_router;
pub use server::{build_state, ApiServer};
