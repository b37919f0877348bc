pub mod audit;
pub mod cycles;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod scheduler;

pub use routes::create_router;
