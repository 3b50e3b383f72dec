//! `devices` and `firmware`.

use tabled::Tabled;

use mysa_core::{DeviceBase, FirmwareDevice};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::Printer;

use super::util::Context;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Range °C")]
    range: String,
    #[tabled(rename = "Zone")]
    zone: String,
}

impl From<&DeviceBase> for DeviceRow {
    fn from(d: &DeviceBase) -> Self {
        let range = match (d.min_setpoint, d.max_setpoint) {
            (Some(lo), Some(hi)) => format!("{lo}-{hi}"),
            _ => String::new(),
        };
        Self {
            id: d.id.clone(),
            name: d.name.clone().unwrap_or_default(),
            model: d.model.clone(),
            range,
            zone: d.zone.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct FirmwareRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Installed")]
    installed: String,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.ensure_session().await?;
    let devices = ctx.client.get_devices().await.map_err(|e| ctx.error(e))?;
    let devices: Vec<DeviceBase> = devices.devices.into_values().collect();

    Printer::new(global).rows(&devices, |d| DeviceRow::from(d), |d| d.id.clone())
}

pub async fn firmware(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.ensure_session().await?;
    let firmwares = ctx
        .client
        .get_device_firmwares()
        .await
        .map_err(|e| ctx.error(e))?;
    let firmwares: Vec<FirmwareDevice> = firmwares.firmware.into_values().collect();

    Printer::new(global).rows(
        &firmwares,
        |f| FirmwareRow {
            device: f.device.clone(),
            installed: f.installed_version.clone(),
        },
        |f| format!("{} {}", f.device, f.installed_version),
    )
}
