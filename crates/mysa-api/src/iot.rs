// AWS IoT control plane (thing registry).
//
// Each thermostat is registered as an IoT thing named after its device id.
// The registry carries attributes the Mysa REST API does not expose, most
// usefully the hardware serial number.

use std::collections::HashMap;

use aws_config::SdkConfig;
use aws_sdk_iot::Client as IotSdkClient;
use aws_sdk_iot::config::{Builder as IotConfigBuilder, Credentials};
use aws_sdk_iot::operation::describe_thing::DescribeThingOutput;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::aws;
use crate::credentials::TransportCredentials;
use crate::error::Error;

const SERVICE: &str = "iot";

/// A thing as described by `DescribeThing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingDescription {
    pub thing_name: String,
    pub thing_id: Option<String>,
    pub thing_type_name: Option<String>,
    pub attributes: HashMap<String, String>,
    pub version: i64,
}

impl ThingDescription {
    /// The `Serial` registry attribute, if set.
    pub fn serial_number(&self) -> Option<&str> {
        self.attributes.get("Serial").map(String::as_str)
    }
}

impl From<&DescribeThingOutput> for ThingDescription {
    fn from(out: &DescribeThingOutput) -> Self {
        Self {
            thing_name: out.thing_name().unwrap_or_default().to_owned(),
            thing_id: out.thing_id().map(str::to_owned),
            thing_type_name: out.thing_type_name().map(str::to_owned),
            attributes: out.attributes().cloned().unwrap_or_default(),
            version: out.version(),
        }
    }
}

/// Client for the IoT thing registry, signed with transport credentials.
#[derive(Clone)]
pub struct IotClient {
    sdk: SdkConfig,
}

impl IotClient {
    pub fn new(sdk: &SdkConfig) -> Self {
        Self { sdk: sdk.clone() }
    }

    /// Look up a thing by name.
    pub async fn describe_thing(
        &self,
        thing_name: &str,
        credentials: &TransportCredentials,
    ) -> Result<ThingDescription, Error> {
        let credentials = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.expose_secret().to_owned(),
            Some(credentials.session_token.expose_secret().to_owned()),
            None,
            "mysa-identity-pool",
        );
        let config = IotConfigBuilder::from(&self.sdk)
            .credentials_provider(credentials)
            .build();
        let client = IotSdkClient::from_conf(config);

        debug!(thing_name, "describing IoT thing");
        let out = client
            .describe_thing()
            .thing_name(thing_name)
            .send()
            .await
            .map_err(|e| aws::sdk_error(SERVICE, e))?;
        Ok(ThingDescription::from(&out))
    }
}
