//! Best-effort claim extraction from host-issued identity tokens.
//!
//! The signature is not verified here: the token is only consulted for an
//! email hint when the current-user query omitted one, and the email is
//! matched against directory rows that were provisioned out-of-band.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use thiserror::Error;

use crate::models::normalize_email;

#[derive(Error, Debug)]
pub enum TokenDecodeError {
    #[error("Identity token must have three dot-separated segments, found {0}")]
    Malformed(usize),

    #[error("Identity token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Identity token payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    email: Option<String>,
    dat: Option<NestedClaims>,
}

#[derive(Debug, Deserialize)]
struct NestedClaims {
    email: Option<String>,
}

/// Read the email claim from a bearer-style identity token.
///
/// Looks at the top-level `email` claim first, then `dat.email`.
pub fn email_from_identity_token(token: &str) -> Result<Option<String>, TokenDecodeError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(TokenDecodeError::Malformed(segments.len()));
    }

    let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    let claims: IdentityClaims = serde_json::from_slice(&payload)?;

    let email = normalize_email(claims.email.as_deref())
        .or_else(|| normalize_email(claims.dat.and_then(|d| d.email).as_deref()));

    Ok(email)
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_top_level_email() {
        let token = encode_test_token(&json!({ "email": "Dana@Example.com", "sub": "1" }));
        assert_eq!(
            email_from_identity_token(&token).unwrap().as_deref(),
            Some("dana@example.com")
        );
    }

    #[test]
    fn falls_back_to_nested_email() {
        let token = encode_test_token(&json!({ "dat": { "user_id": 7, "email": "n@x.io" } }));
        assert_eq!(
            email_from_identity_token(&token).unwrap().as_deref(),
            Some("n@x.io")
        );
    }

    #[test]
    fn token_without_email_yields_none() {
        let token = encode_test_token(&json!({ "dat": { "user_id": 7 } }));
        assert_eq!(email_from_identity_token(&token).unwrap(), None);
    }

    #[test]
    fn tolerates_padding_on_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE
            .encode(json!({ "email": "p@x.io" }).to_string());
        let token = format!("h.{}.s", payload);
        assert_eq!(
            email_from_identity_token(&token).unwrap().as_deref(),
            Some("p@x.io")
        );
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(matches!(
            email_from_identity_token("only.two"),
            Err(TokenDecodeError::Malformed(2))
        ));
    }

    #[test]
    fn rejects_non_json_payload() {
        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(
            email_from_identity_token(&token),
            Err(TokenDecodeError::Json(_))
        ));
    }
}
