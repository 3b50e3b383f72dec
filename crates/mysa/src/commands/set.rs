//! `set`: change a device's set point and/or mode.

use mysa_core::DeviceMode;

use crate::cli::{GlobalOpts, ModeArg, SetArgs};
use crate::error::CliError;
use crate::output::Printer;

use super::util::Context;

impl From<ModeArg> for DeviceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Off => Self::Off,
            ModeArg::Heat => Self::Heat,
            ModeArg::Cool => Self::Cool,
            ModeArg::Dry => Self::Dry,
            ModeArg::FanOnly => Self::FanOnly,
            ModeArg::Auto => Self::Auto,
        }
    }
}

fn validate_temperature(value: Option<f64>) -> Result<Option<f64>, CliError> {
    match value {
        Some(t) if !t.is_finite() => Err(CliError::Validation {
            field: "temperature".into(),
            reason: format!("{t} is not a number"),
        }),
        other => Ok(other),
    }
}

pub async fn handle(ctx: &Context, args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let set_point = validate_temperature(args.temperature)?;
    let mode = args.mode.map(DeviceMode::from);

    ctx.ensure_session().await?;
    let sent = ctx
        .client
        .set_device_state(&args.device_id, set_point, mode)
        .await
        .map_err(|e| ctx.error(e));
    if let Err(e) = ctx.client.shutdown().await {
        tracing::debug!(error = %e, "transport shutdown after command failed");
    }
    sent?;

    let mut parts = Vec::new();
    if let Some(t) = set_point {
        parts.push(format!("set point {t}°C"));
    }
    if let Some(m) = mode {
        parts.push(format!("mode {m}"));
    }
    let message = format!("Sent {} to {}", parts.join(" and "), args.device_id);
    Printer::new(global).done(&message);
    Ok(())
}
