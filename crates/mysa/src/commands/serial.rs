//! `serial`: look up a device's hardware serial number.

use serde::Serialize;

use crate::cli::{GlobalOpts, SerialArgs};
use crate::error::CliError;
use crate::output::Printer;

use super::util::Context;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SerialLookup {
    device_id: String,
    serial_number: Option<String>,
}

pub async fn handle(ctx: &Context, args: SerialArgs, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.ensure_session().await?;
    let serial_number = ctx
        .client
        .get_device_serial_number(&args.device_id)
        .await
        .map_err(|e| ctx.error(e))?;

    let lookup = SerialLookup {
        device_id: args.device_id,
        serial_number,
    };
    Printer::new(global).item(
        &lookup,
        |l| match l.serial_number {
            Some(ref serial) => format!("{}: {serial}", l.device_id),
            None => format!("{}: serial number unavailable", l.device_id),
        },
        |l| l.serial_number.clone().unwrap_or_default(),
    )
}
