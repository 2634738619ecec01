pub mod handlers;
pub mod middleware;
pub mod router;

pub use router::router;
