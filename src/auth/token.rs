use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{AuthError, AuthResult};
use crate::http::{redact_url, ApiClient, EndpointGroup, RequestOptions};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Trade a single-use grant token for a bearer token and persist it.
///
/// Never retried: the provider burns the grant token on first use.
pub async fn exchange(client: &ApiClient, grant_token: &str) -> AuthResult<SecretString> {
    let url = format!("{}/token", client.endpoints().platform_root());
    let options = RequestOptions::third_party()
        .header("X-Requested-With", "XMLHttpRequest")
        .query("grant_token", grant_token)
        .no_retry();
    let outcome = client
        .execute(Method::GET, EndpointGroup::Platform, &url, options)
        .await?;

    if outcome.status.as_u16() != 200 {
        return Err(AuthError::TokenExchange {
            status: outcome.status.as_u16(),
            url: redact_url(&outcome.url),
        });
    }

    let token = outcome
        .json::<TokenResponse>()?
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::ProtocolExtraction {
            what: "access_token",
            url: redact_url(&outcome.url),
        })?;

    client.credentials().set_api_token(&token).await?;
    tracing::info!("bearer token stored");
    Ok(SecretString::from(token))
}
