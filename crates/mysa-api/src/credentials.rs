// Short-lived AWS credentials for the realtime transport.
//
// The IoT endpoint does not accept Cognito user pool tokens directly.
// The id token is first exchanged with a Cognito identity pool for a
// temporary access key / secret / session token triple, which is then
// used to SigV4-sign the MQTT WebSocket URL.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cognitoidentity::Client as IdentityClient;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::aws;
use crate::error::Error;

const SERVICE: &str = "cognito-identity";

/// Temporary AWS credentials issued by the identity broker.
#[derive(Debug, Clone)]
pub struct TransportCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: SecretString,
    pub expiration: Option<DateTime<Utc>>,
}

/// Exchanges an identity token for [`TransportCredentials`].
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn exchange(&self, id_token: &SecretString) -> Result<TransportCredentials, Error>;
}

// ── Cognito Identity ────────────────────────────────────────────────

/// [`CredentialBroker`] backed by a Cognito identity pool.
pub struct CognitoIdentityBroker {
    client: IdentityClient,
    identity_pool_id: String,
    login_provider: String,
}

impl CognitoIdentityBroker {
    /// Create a broker for an identity pool federated with a user pool.
    pub fn new(sdk: &SdkConfig, identity_pool_id: String, user_pool_id: &str) -> Self {
        let region = sdk.region().map_or_else(String::new, ToString::to_string);
        Self {
            client: IdentityClient::new(sdk),
            identity_pool_id,
            login_provider: login_provider(&region, user_pool_id),
        }
    }
}

/// The `Logins` map key for a Cognito user pool.
pub fn login_provider(region: &str, user_pool_id: &str) -> String {
    format!("cognito-idp.{region}.amazonaws.com/{user_pool_id}")
}

fn incomplete(what: &str) -> Error {
    Error::Aws {
        service: SERVICE,
        kind: "IncompleteResponse".into(),
        message: format!("response carried no {what}"),
    }
}

#[async_trait]
impl CredentialBroker for CognitoIdentityBroker {
    async fn exchange(&self, id_token: &SecretString) -> Result<TransportCredentials, Error> {
        let token = id_token.expose_secret();

        let id = self
            .client
            .get_id()
            .identity_pool_id(&self.identity_pool_id)
            .logins(&self.login_provider, token)
            .send()
            .await
            .map_err(|e| aws::sdk_error(SERVICE, e))?;
        let identity_id = id.identity_id().ok_or_else(|| incomplete("identity id"))?;

        debug!(identity_id, "resolved identity, requesting credentials");

        let resp = self
            .client
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .logins(&self.login_provider, token)
            .send()
            .await
            .map_err(|e| aws::sdk_error(SERVICE, e))?;
        let creds = resp.credentials().ok_or_else(|| incomplete("credentials"))?;

        let field = |value: Option<&str>, what: &str| {
            value.map(str::to_owned).ok_or_else(|| incomplete(what))
        };
        Ok(TransportCredentials {
            access_key_id: field(creds.access_key_id(), "access key id")?,
            secret_access_key: SecretString::from(field(creds.secret_key(), "secret key")?),
            session_token: SecretString::from(field(creds.session_token(), "session token")?),
            expiration: creds
                .expiration()
                .and_then(|at| DateTime::from_timestamp(at.secs(), 0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpConfig;

    #[test]
    fn login_provider_names_the_user_pool() {
        assert_eq!(
            login_provider("us-east-1", "us-east-1_pool"),
            "cognito-idp.us-east-1.amazonaws.com/us-east-1_pool"
        );
    }

    #[test]
    fn broker_derives_provider_from_region() {
        let sdk = aws::sdk_config("eu-west-1", &HttpConfig::default(), None);
        let broker = CognitoIdentityBroker::new(&sdk, "pool".into(), "eu-west-1_abc");
        assert_eq!(
            broker.login_provider,
            "cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc"
        );
    }
}
