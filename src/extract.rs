//! Value extraction from the provider's fixed markup and redirect URLs.
//!
//! These are anchored pattern matches on known field names, not an HTML
//! parser. They tolerate attribute order and quote style and nothing more.

use regex::Regex;

fn first_capture(pattern: &str, text: &str) -> Option<String> {
    // Patterns are built from escaped names, so compilation cannot fail.
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(text)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().to_string())
}

/// A quoted attribute value. The closing quote must match the opening one.
const QUOTED_VALUE: &str = r#"(?:"([^"]*)"|'([^']*)')"#;

/// Value of the tag attribute pair `name=<name>` / `<value_attr>=...`, in either order.
fn attribute_pair(name_attr: &str, name: &str, value_attr: &str, html: &str) -> Option<String> {
    let name = regex::escape(name);
    let name_first =
        format!(r#"<[^>]*\s{name_attr}=["']{name}["'][^>]*\s{value_attr}={QUOTED_VALUE}"#);
    let value_first =
        format!(r#"<[^>]*\s{value_attr}={QUOTED_VALUE}[^>]*\s{name_attr}=["']{name}["']"#);
    first_capture(&name_first, html).or_else(|| first_capture(&value_first, html))
}

/// Value of a named form field, e.g. `<input type="hidden" name="tx" value="...">`.
///
/// ```
/// use synack_auth::extract::form_field;
///
/// let html = r#"<input type="hidden" value="XYZ" name="tx">"#;
/// assert_eq!(form_field("tx", html).as_deref(), Some("XYZ"));
/// ```
pub fn form_field(name: &str, html: &str) -> Option<String> {
    attribute_pair("name", name, "value", html)
}

/// Content of a named meta tag, e.g. `<meta name="csrf-token" content="...">`.
pub fn meta_content(name: &str, html: &str) -> Option<String> {
    attribute_pair("name", name, "content", html)
}

/// Raw value of a query parameter anywhere in a URL.
pub fn query_param(name: &str, url: &str) -> Option<String> {
    let name = regex::escape(name);
    first_capture(&format!(r"[?&]{name}=([^&#]*)"), url)
}
