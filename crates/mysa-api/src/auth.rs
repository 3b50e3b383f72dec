// Cognito User Pool authentication.
//
// Mysa accounts live in an AWS Cognito user pool. A login yields an
// id/access/refresh token triple; the id token authorizes REST calls and
// the credential exchange, the refresh token renews the pair when the
// id token's `exp` claim passes.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_cognitoidentityprovider::error::SdkError;
use aws_sdk_cognitoidentityprovider::operation::initiate_auth::{
    InitiateAuthError, InitiateAuthOutput,
};
use aws_sdk_cognitoidentityprovider::types::AuthFlowType;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::aws;
use crate::error::Error;

const SERVICE: &str = "cognito-idp";

// ── TokenSet ────────────────────────────────────────────────────────

/// The token triple issued by the identity provider, plus the instant
/// after which it must be refreshed.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub id_token: SecretString,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Build a token set, reading the expiry from the JWT `exp` claims.
    ///
    /// The earlier of the id and access token expiries wins. When neither
    /// token carries a readable claim, `fallback` is used; without a
    /// fallback the set is treated as already expired.
    pub fn from_jwts(
        id_token: String,
        access_token: String,
        refresh_token: String,
        fallback: Option<DateTime<Utc>>,
    ) -> Self {
        let claimed = [jwt_expiry(&id_token), jwt_expiry(&access_token)]
            .into_iter()
            .flatten()
            .min();
        let expires_at = claimed
            .or(fallback)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Self {
            id_token: SecretString::from(id_token),
            access_token: SecretString::from(access_token),
            refresh_token: SecretString::from(refresh_token),
            expires_at,
        }
    }

    /// Whether the tokens are still usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Read the `exp` claim from a JWT without verifying its signature.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data =
        jsonwebtoken::decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()?;
    DateTime::from_timestamp(data.claims.exp, 0)
}

// ── Authenticator ───────────────────────────────────────────────────

/// Exchanges user credentials (or a refresh token) for a [`TokenSet`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a user with their password.
    async fn authenticate(&self, username: &str, password: &SecretString)
    -> Result<TokenSet, Error>;

    /// Renew the id/access tokens. Fails with [`Error::SessionExpired`]
    /// when the refresh token itself is no longer accepted.
    async fn refresh(&self, username: &str, refresh_token: &SecretString)
    -> Result<TokenSet, Error>;
}

// ── Cognito ─────────────────────────────────────────────────────────

/// [`Authenticator`] backed by the Cognito User Pools `InitiateAuth` API.
pub struct CognitoAuthenticator {
    client: CognitoClient,
    client_id: String,
}

/// Tokens pulled out of a successful `InitiateAuth` response.
struct IssuedTokens {
    id_token: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i32,
}

impl CognitoAuthenticator {
    /// Create an authenticator for the given app client.
    pub fn new(sdk: &SdkConfig, client_id: String) -> Self {
        Self {
            client: CognitoClient::new(sdk),
            client_id,
        }
    }

    async fn initiate_auth(
        &self,
        flow: AuthFlowType,
        parameters: &[(&str, &str)],
    ) -> Result<InitiateAuthOutput, SdkError<InitiateAuthError>> {
        let mut request = self
            .client
            .initiate_auth()
            .auth_flow(flow)
            .client_id(&self.client_id);
        for (key, value) in parameters {
            request = request.auth_parameters(*key, *value);
        }
        request.send().await
    }
}

fn issued_tokens(output: &InitiateAuthOutput) -> Result<IssuedTokens, Error> {
    let Some(result) = output.authentication_result() else {
        let message = match output.challenge_name() {
            Some(challenge) => format!("unsupported authentication challenge '{}'", challenge.as_str()),
            None => "identity provider returned no tokens".into(),
        };
        return Err(Error::Authentication { message });
    };

    let missing = |what: &str| Error::Authentication {
        message: format!("identity provider returned no {what}"),
    };
    Ok(IssuedTokens {
        id_token: result.id_token().ok_or_else(|| missing("id token"))?.to_owned(),
        access_token: result
            .access_token()
            .ok_or_else(|| missing("access token"))?
            .to_owned(),
        refresh_token: result.refresh_token().map(str::to_owned),
        expires_in: result.expires_in(),
    })
}

fn expiry_hint(expires_in: i32) -> Option<DateTime<Utc>> {
    (expires_in > 0).then(|| Utc::now() + TimeDelta::seconds(i64::from(expires_in)))
}

#[async_trait]
impl Authenticator for CognitoAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<TokenSet, Error> {
        debug!(username, "authenticating with Cognito");

        let output = self
            .initiate_auth(
                AuthFlowType::UserPasswordAuth,
                &[("USERNAME", username), ("PASSWORD", password.expose_secret())],
            )
            .await
            .map_err(|err| match err.as_service_error() {
                Some(InitiateAuthError::NotAuthorizedException(e)) => Error::Authentication {
                    message: e.message().unwrap_or("not authorized").to_owned(),
                },
                Some(InitiateAuthError::UserNotFoundException(e)) => Error::Authentication {
                    message: e.message().unwrap_or("user not found").to_owned(),
                },
                _ => aws::sdk_error(SERVICE, err),
            })?;

        let issued = issued_tokens(&output)?;
        let refresh_token = issued.refresh_token.ok_or_else(|| Error::Authentication {
            message: "identity provider returned no refresh token".into(),
        })?;

        debug!("authentication successful");
        Ok(TokenSet::from_jwts(
            issued.id_token,
            issued.access_token,
            refresh_token,
            expiry_hint(issued.expires_in),
        ))
    }

    async fn refresh(
        &self,
        username: &str,
        refresh_token: &SecretString,
    ) -> Result<TokenSet, Error> {
        debug!(username, "refreshing Cognito tokens");

        let output = self
            .initiate_auth(
                AuthFlowType::RefreshTokenAuth,
                &[("REFRESH_TOKEN", refresh_token.expose_secret())],
            )
            .await
            .map_err(|err| match err.as_service_error() {
                Some(InitiateAuthError::NotAuthorizedException(e)) => Error::SessionExpired {
                    message: e.message().unwrap_or("refresh token rejected").to_owned(),
                },
                _ => aws::sdk_error(SERVICE, err),
            })?;

        let issued = issued_tokens(&output)?;
        // Cognito only rotates the refresh token when rotation is enabled.
        let refresh_token = issued
            .refresh_token
            .unwrap_or_else(|| refresh_token.expose_secret().to_owned());

        Ok(TokenSet::from_jwts(
            issued.id_token,
            issued.access_token,
            refresh_token,
            expiry_hint(issued.expires_in),
        ))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    fn jwt_with_claims(claims: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"k1"}"#);
        let claims = URL_SAFE_NO_PAD.encode(claims);
        format!("{header}.{claims}.c2ln")
    }

    fn jwt_with_exp(exp: i64) -> String {
        jwt_with_claims(&format!(r#"{{"exp":{exp},"sub":"u"}}"#))
    }

    #[test]
    fn reads_exp_claim() {
        let exp = jwt_expiry(&jwt_with_exp(1_700_000_000)).unwrap();
        assert_eq!(exp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn audience_does_not_matter() {
        let token = jwt_with_claims(r#"{"exp":1700000000,"aud":"19efs8tgqe942atbqmot5m36t3"}"#);
        assert_eq!(jwt_expiry(&token).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn garbage_token_has_no_expiry() {
        assert!(jwt_expiry("not-a-jwt").is_none());
        assert!(jwt_expiry("a.%%%.c").is_none());
        assert!(jwt_expiry(&jwt_with_claims(r#"{"sub":"u"}"#)).is_none());
    }

    #[test]
    fn earliest_claim_wins() {
        let tokens = TokenSet::from_jwts(
            jwt_with_exp(2_000),
            jwt_with_exp(1_000),
            "refresh".into(),
            None,
        );
        assert_eq!(tokens.expires_at.timestamp(), 1_000);
    }

    #[test]
    fn unreadable_tokens_without_fallback_are_expired() {
        let tokens = TokenSet::from_jwts("a".into(), "b".into(), "c".into(), None);
        assert!(!tokens.is_valid_at(Utc::now()));
    }

    #[test]
    fn fallback_used_when_claims_missing() {
        let fallback = DateTime::from_timestamp(5_000, 0).unwrap();
        let tokens = TokenSet::from_jwts("a".into(), "b".into(), "c".into(), Some(fallback));
        assert_eq!(tokens.expires_at, fallback);
        assert!(tokens.is_valid_at(DateTime::from_timestamp(4_999, 0).unwrap()));
        assert!(!tokens.is_valid_at(fallback));
    }

    #[test]
    fn no_expiry_hint_without_lifetime() {
        assert!(expiry_hint(0).is_none());
        assert!(expiry_hint(3600).unwrap() > Utc::now());
    }
}
