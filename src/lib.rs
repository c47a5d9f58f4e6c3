pub mod auth;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod error;
pub mod extract;
pub mod http;

pub use auth::Authenticator;
pub use error::{AuthError, AuthResult};
