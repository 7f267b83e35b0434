//! HTTP front end over the chain supervisor.

pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::create_router;
