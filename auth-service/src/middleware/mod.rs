pub mod auth;

pub use auth::{auth_middleware, AuthUser, MAX_TOKEN_SIZE};
