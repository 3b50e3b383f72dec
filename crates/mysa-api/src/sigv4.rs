// Presigned URLs for the AWS IoT device gateway.
//
// The MQTT WebSocket is authorized by a SigV4 signature in the query
// string. The gateway expects the session token to be appended after the
// signature rather than included in the canonical query.

use std::time::SystemTime;

use aws_sdk_iot::config::Credentials;
use aws_sigv4::http_request::{
    SessionTokenMode, SignableBody, SignableRequest, SignatureLocation, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use secrecy::ExposeSecret;
use url::Url;

use crate::credentials::TransportCredentials;
use crate::error::Error;

/// Signing name of the IoT data plane.
pub const IOT_SIGNING_NAME: &str = "iotdevicegateway";

const SECURITY_TOKEN_PARAM: &str = "X-Amz-Security-Token";

fn signing_error(e: impl std::fmt::Display) -> Error {
    Error::Encode {
        message: format!("unable to sign the broker URL: {e}"),
    }
}

/// Presign `wss://{host}/mqtt` with the given transport credentials.
pub fn presign_iot_websocket(
    host: &str,
    region: &str,
    credentials: &TransportCredentials,
    time: SystemTime,
) -> Result<Url, Error> {
    let session_token = credentials.session_token.expose_secret().to_owned();
    let identity = Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.expose_secret().to_owned(),
        Some(session_token.clone()),
        None,
        "mysa-identity-pool",
    )
    .into();

    let mut settings = SigningSettings::default();
    settings.signature_location = SignatureLocation::QueryParams;
    settings.session_token_mode = SessionTokenMode::Exclude;

    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(IOT_SIGNING_NAME)
        .time(time)
        .settings(settings)
        .build()
        .map_err(signing_error)?
        .into();

    // The signature covers method, host and path; the scheme is not signed.
    let https = format!("https://{host}/mqtt");
    let request = SignableRequest::new("GET", &https, std::iter::empty(), SignableBody::Bytes(&[]))
        .map_err(signing_error)?;
    let (instructions, _signature) = sign(request, &params).map_err(signing_error)?.into_parts();

    let mut url = Url::parse(&format!("wss://{host}/mqtt"))?;
    let mut has_token = false;
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in instructions.params() {
            has_token |= *name == SECURITY_TOKEN_PARAM;
            query.append_pair(name, value);
        }
        if !has_token && !session_token.is_empty() {
            query.append_pair(SECURITY_TOKEN_PARAM, &session_token);
        }
    }
    Ok(url)
}

// ── Tests ────────────────────────────────────────────────────────────
