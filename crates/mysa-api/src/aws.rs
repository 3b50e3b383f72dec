// Shared AWS SDK plumbing.
//
// Cognito User Pools, Cognito Identity and the IoT control plane are all
// reached through the official SDK clients. They share one `SdkConfig`
// carrying the region, the call timeout and (in tests) an endpoint
// override. Retries are left to the caller.

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iot::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::trace;

use crate::error::Error;
use crate::http::HttpConfig;

/// Build the SDK configuration for every AWS client.
///
/// `endpoint_url` replaces the regional endpoint of every service; it is
/// meant for local fakes.
pub fn sdk_config(region: &str, http: &HttpConfig, endpoint_url: Option<&str>) -> SdkConfig {
    let mut builder = SdkConfig::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(region.to_owned()))
        .retry_config(RetryConfig::disabled())
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(http.timeout)
                .build(),
        );
    if let Some(url) = endpoint_url {
        builder = builder.endpoint_url(url);
    }
    builder.build()
}

/// Translate an SDK failure into [`Error::Aws`] (the service answered)
/// or [`Error::AwsRequest`] (it never did).
pub(crate) fn sdk_error<E, R>(service: &'static str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let Some(service_err) = err.as_service_error() {
        let kind = service_err.code().unwrap_or("Unknown").to_owned();
        let message = service_err.message().unwrap_or_default().to_owned();
        trace!(%kind, "AWS {service} error response");
        return Error::Aws {
            service,
            kind,
            message,
        };
    }
    Error::AwsRequest {
        service,
        message: DisplayErrorContext(&err).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn config_carries_region_and_override() {
        let http = HttpConfig {
            timeout: Duration::from_secs(7),
            ..HttpConfig::default()
        };
        let cfg = sdk_config("ca-central-1", &http, Some("http://127.0.0.1:9"));

        assert_eq!(cfg.region().map(ToString::to_string), Some("ca-central-1".to_owned()));
        assert_eq!(cfg.endpoint_url(), Some("http://127.0.0.1:9"));
        assert_eq!(
            cfg.timeout_config().and_then(TimeoutConfig::operation_timeout),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn no_override_by_default() {
        let cfg = sdk_config("us-east-1", &HttpConfig::default(), None);
        assert!(cfg.endpoint_url().is_none());
    }
}
