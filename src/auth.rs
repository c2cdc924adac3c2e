use actix_web::{http::header::AUTHORIZATION, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use uuid::Uuid;

use crate::error_code::ErrorCode;

pub(crate) const ISSUER: &str = "tubely-access";

#[derive(Debug, thiserror::Error)]
pub(crate) enum AuthError {
    #[error("Couldn't find a bearer token")]
    MissingToken,

    #[error("No jwt secret is configured")]
    Unconfigured,

    #[error("Couldn't validate token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Token subject isn't a user id")]
    InvalidSubject(#[source] uuid::Error),
}

impl AuthError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingToken => ErrorCode::MISSING_TOKEN,
            Self::Unconfigured | Self::InvalidToken(_) | Self::InvalidSubject(_) => {
                ErrorCode::INVALID_TOKEN
            }
        }
    }
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub(crate) struct Claims {
    pub(crate) iss: String,
    pub(crate) sub: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

/// The token from an `Authorization: Bearer <token>` header
pub(crate) fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::MissingToken)?;

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

/// Check an HS256 access token, returning the user it was issued to
pub(crate) fn validate_jwt(token: &str, secret: &str) -> Result<Uuid, AuthError> {
    // an empty key would accept tokens anyone can sign
    if secret.is_empty() {
        return Err(AuthError::Unconfigured);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(AuthError::InvalidToken)?;

    Uuid::parse_str(&data.claims.sub).map_err(AuthError::InvalidSubject)
}

#[tracing::instrument(skip_all)]
pub(crate) fn authenticate(req: &HttpRequest, secret: &str) -> Result<Uuid, AuthError> {
    let token = bearer_token(req)?;

    validate_jwt(token, secret)
}

#[cfg(test)]
pub(crate) fn make_jwt(user_id: Uuid, secret: &str, expires_in: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = time::OffsetDateTime::now_utc().unix_timestamp();

    let claims = Claims {
        iss: ISSUER.to_string(),
        sub: user_id.to_string(),
        iat: now,
        exp: now + expires_in,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encoded token")
}

#[cfg(test)]
mod tests {
    use super::{authenticate, make_jwt, validate_jwt, AuthError, Claims, ISSUER};
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

    #[test]
    fn valid_token_yields_user() {
        let user_id = Uuid::new_v4();
        let token = make_jwt(user_id, SECRET, 3600);

        assert_eq!(validate_jwt(&token, SECRET).expect("valid token"), user_id);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_jwt(Uuid::new_v4(), SECRET, 3600);

        assert!(matches!(
            validate_jwt(&token, "some other secret"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn empty_secret_rejects_everything() {
        let token = make_jwt(Uuid::new_v4(), "", 3600);

        assert!(matches!(validate_jwt(&token, ""), Err(AuthError::Unconfigured)));
    }

    #[test]
    fn expired_token_is_rejected() {
        // well past the default leeway
        let token = make_jwt(Uuid::new_v4(), SECRET, -300);

        assert!(matches!(
            validate_jwt(&token, SECRET),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn wrong_issuer_or_subject_is_rejected() {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let key = EncodingKey::from_secret(SECRET.as_bytes());

        let wrong_issuer = Claims {
            iss: "someone-else".into(),
            sub: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(&Header::default(), &wrong_issuer, &key).expect("encoded");
        assert!(matches!(
            validate_jwt(&token, SECRET),
            Err(AuthError::InvalidToken(_))
        ));

        let wrong_subject = Claims {
            iss: ISSUER.into(),
            sub: "not-a-uuid".into(),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(&Header::default(), &wrong_subject, &key).expect("encoded");
        assert!(matches!(
            validate_jwt(&token, SECRET),
            Err(AuthError::InvalidSubject(_))
        ));
    }

    #[test]
    fn header_must_be_bearer() {
        let user_id = Uuid::new_v4();
        let token = make_jwt(user_id, SECRET, 3600);

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();
        assert_eq!(authenticate(&req, SECRET).expect("authenticated"), user_id);

        for header in [None, Some(token.clone()), Some("Bearer ".to_string())] {
            let req = match header {
                Some(header) => TestRequest::default().insert_header(("Authorization", header)),
                None => TestRequest::default(),
            }
            .to_http_request();

            assert!(matches!(
                authenticate(&req, SECRET),
                Err(AuthError::MissingToken)
            ));
        }
    }
}
