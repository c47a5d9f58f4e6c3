//! Platform login and the Duo MFA flow.
//!
//! [`Authenticator::obtain_bearer_token`] is the entry point. It probes the
//! stored token, runs the password login when that fails, drives
//! [`DuoFlow`] through the provider's challenge and exchanges the resulting
//! grant token for a bearer token.

mod duo;
pub mod hotp;
mod login;
pub mod script;
mod status;
pub mod token;

pub use duo::{client_hints, select_push_device, DuoFlow, Factor, MfaConfig};
pub use login::Authenticator;
pub use status::MfaStatus;
