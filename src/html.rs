// Form-field extraction from the SSO response pages

use scraper::{Html, Selector};

use crate::error::{MoparError, Result};

/// Returns the `value` attribute of the `<input name="{field}">` element.
///
/// A missing element or a missing `value` attribute are both errors: the SSO
/// page is the only place these fields come from.
pub fn extract_field(document: &str, field: &str) -> Result<String> {
    let document = Html::parse_document(document);
    let selector = Selector::parse(&format!("input[name=\"{field}\"]"))
        .map_err(|e| MoparError::Protocol(format!("invalid selector for field {field}: {e:?}")))?;

    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| MoparError::Protocol(format!("field {field} not found in login response")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAML_FORM: &str = r#"
        <html><body onload="document.forms[0].submit()">
          <form method="POST" action="https://www.mopar.com/sign-in">
            <input type="hidden" name="RelayState" value="relay-123"/>
            <input type="hidden" name="SAMLResponse" value="PHNhbWw+"/>
            <noscript><input type="submit" value="Continue"/></noscript>
          </form>
        </body></html>"#;

    #[test]
    fn extracts_hidden_inputs() {
        assert_eq!(extract_field(SAML_FORM, "RelayState").unwrap(), "relay-123");
        assert_eq!(extract_field(SAML_FORM, "SAMLResponse").unwrap(), "PHNhbWw+");
    }

    #[test]
    fn missing_field_is_an_error() {
        let err = extract_field("<html><body>Invalid login</body></html>", "RelayState").unwrap_err();
        assert!(matches!(err, MoparError::Protocol(_)));
    }

    #[test]
    fn input_without_value_is_an_error() {
        let err = extract_field(r#"<input name="RelayState">"#, "RelayState").unwrap_err();
        assert!(matches!(err, MoparError::Protocol(_)));
    }
}
