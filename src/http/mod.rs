//! HTTP plumbing: endpoint routing, the shared session and the retrying
//! request layer.

mod endpoints;
mod outcome;
mod request;
mod session;

pub use endpoints::{is_absolute, EndpointGroup, Endpoints};
pub use outcome::{Classification, RequestOutcome};
pub(crate) use request::redact_url;
pub use request::{ApiClient, RequestOptions, RetryConfig};
pub use session::{HttpSession, ProxySettings};
