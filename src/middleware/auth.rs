use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::auth::Claims;
use crate::config;
use crate::error::ApiError;

/// Bearer-token middleware: verifies the access token against the realm's
/// public key and injects the caller's `Principal` into the request.
pub async fn bearer_auth(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers).map_err(ApiError::unauthorized)?;
    let claims = verify_access_token(&token).map_err(ApiError::unauthorized)?;

    let principal = claims.principal(&config::config().identity.client_id);
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.to_string()),
        Some(_) => Err("Empty bearer token".to_string()),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}

fn verify_access_token(token: &str) -> Result<Claims, String> {
    let configured_key = &config::config().identity.realm_public_key;
    if configured_key.is_empty() {
        return Err("Token verification key not configured".to_string());
    }

    let pem = to_pem(configured_key);
    let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|_| "Token verification key is invalid".to_string())?;

    let mut validation = Validation::new(Algorithm::RS256);
    // Keycloak access tokens carry `account` as audience; the client roles
    // are checked downstream instead.
    validation.validate_aud = false;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| format!("Invalid access token: {e}"))
}

/// Realm settings export the bare base64 key body; wrap it into a PEM block
/// unless one was configured directly.
fn to_pem(key: &str) -> String {
    if key.starts_with("-----BEGIN") {
        return key.to_string();
    }
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    let body = key.trim();
    for chunk in body.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap_or(""));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn missing_header_is_rejected() {
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        assert!(extract_bearer_token(&headers_with("Basic abc")).is_err());
    }

    #[test]
    fn bearer_token_is_extracted() {
        let token = extract_bearer_token(&headers_with("Bearer abc.def.ghi")).unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn bare_key_is_wrapped_into_pem() {
        let pem = to_pem("MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8A");
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
    }

    #[test]
    fn existing_pem_is_left_alone() {
        let key = "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----";
        assert_eq!(to_pem(key), key);
    }
}
