#[allow(clippy::module_inception)]
pub mod auth;
pub mod jwt;
pub mod middleware;

pub use auth::AuthUser;
