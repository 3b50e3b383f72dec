//! `states`: last reported state of every device.

use chrono::{DateTime, Utc};
use tabled::Tabled;

use mysa_core::{DeviceMode, DeviceState};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::Printer;

use super::util::Context;

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Temp °C")]
    temperature: String,
    #[tabled(rename = "Humidity %")]
    humidity: String,
    #[tabled(rename = "Set point")]
    set_point: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Online")]
    connected: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

fn fmt_reading(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_default()
}

/// Reported mode codes are floats in the state document.
#[allow(clippy::cast_possible_truncation)]
fn mode_name(code: Option<f64>) -> String {
    code.and_then(|c| DeviceMode::from_wire_code(c.round() as i64))
        .map(|m| m.to_string())
        .or_else(|| code.map(|c| format!("code {c}")))
        .unwrap_or_default()
}

fn updated(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_default()
}

impl From<&DeviceState> for StateRow {
    fn from(s: &DeviceState) -> Self {
        let temperature = s.corrected_temp.or(s.sensor_temp).map(|r| r.v);
        Self {
            device: s.device.clone(),
            temperature: fmt_reading(temperature),
            humidity: fmt_reading(s.humidity.map(|r| r.v)),
            set_point: fmt_reading(s.set_point.map(|r| r.v)),
            mode: mode_name(s.tstat_mode.or(s.mode).map(|r| r.v)),
            connected: s
                .connected
                .map(|r| if r.v { "yes" } else { "no" }.to_owned())
                .unwrap_or_default(),
            updated: updated(s.timestamp),
        }
    }
}

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.ensure_session().await?;
    let states = ctx
        .client
        .get_device_states()
        .await
        .map_err(|e| ctx.error(e))?;
    let states: Vec<DeviceState> = states.states.into_values().collect();

    Printer::new(global).rows(&states, |s| StateRow::from(s), |s| s.device.clone())
}
