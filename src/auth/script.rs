//! Browser bootstrap script.
//!
//! `login.js` seeds a browser tab with the bearer token so the web platform
//! can be used without a second interactive login. Paste it into the login
//! page's console or load it from a userscript manager.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::http::Endpoints;

pub const SCRIPT_FILE: &str = "login.js";
const SESSION_STORAGE_KEY: &str = "shared-session-com.synack.accessToken";
const REDIRECT_DELAY_MS: u32 = 60_000;

/// Render the script for `token`.
pub fn render(endpoints: &Endpoints, token: &str) -> String {
    let login = format!("{}/", endpoints.login_root());
    let platform = endpoints.platform_root();
    let token = token.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "let forceLogin = () => {{\
const loc = window.location;\
if(loc.href.startsWith('{login}')) {{\
loc.replace('{platform}');\
}}}};\
(function() {{\
sessionStorage.setItem('{SESSION_STORAGE_KEY}','{token}');\
setTimeout(forceLogin,{REDIRECT_DELAY_MS});\
let btn = document.createElement('button');\
btn.addEventListener('click',forceLogin);\
btn.style = 'margin-top: 20px;';\
btn.innerText = 'SynackAPI Log In';\
btn.classList.add('btn');\
btn.classList.add('btn-blue');\
document.getElementsByClassName('onboarding-form')[0].appendChild(btn)}}\
)();"
    )
}

/// Write `login.js` into `dir`, creating it if needed.
pub async fn write(dir: &Path, endpoints: &Endpoints, token: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    let path = dir.join(SCRIPT_FILE);
    tokio::fs::write(&path, render(endpoints, token))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "login script written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_embeds_token_and_hosts() -> anyhow::Result<()> {
        let endpoints = Endpoints::for_domain("synack.com")?;
        let script = render(&endpoints, "tok'en");

        assert!(script.contains(
            "sessionStorage.setItem('shared-session-com.synack.accessToken','tok\\'en');"
        ));
        assert!(script.contains("if(loc.href.startsWith('https://login.synack.com/'))"));
        assert!(script.contains("loc.replace('https://platform.synack.com');"));
        assert!(script.contains("setTimeout(forceLogin,60000);"));
        Ok(())
    }

    #[tokio::test]
    async fn write_creates_missing_directory() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let target = dir.path().join("nested");
        let endpoints = Endpoints::for_domain("synack.com")?;

        let path = write(&target, &endpoints, "abc").await?;
        assert_eq!(path, target.join("login.js"));
        assert!(std::fs::read_to_string(path)?.contains("'abc'"));
        Ok(())
    }
}
