//! `watch`: stream realtime device events until Ctrl-C.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use mysa_core::{ConnectionStatus, SetPointChange, StateChange, Status};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output::{self, Printer};

use super::util::Context;

/// One line of watch output. JSON formats tag each line with its kind.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum WatchEvent {
    Status(Status),
    SetPoint(SetPointChange),
    State(StateChange),
    Raw { payload: serde_json::Value },
}

impl WatchEvent {
    fn label(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::SetPoint(_) => "setpoint",
            Self::State(_) => "state",
            Self::Raw { .. } => "raw",
        }
    }

    fn text(&self) -> String {
        match self {
            Self::Status(s) => {
                let mut line = format!(
                    "{} {:.1}°C {:.0}% set {:.1}°C",
                    s.device_id, s.temperature, s.humidity, s.set_point
                );
                if let Some(current) = s.current {
                    line.push_str(&format!(" current {current}A"));
                }
                if let Some(duty) = s.duty_cycle {
                    line.push_str(&format!(" duty {duty}"));
                }
                line
            }
            Self::SetPoint(c) => format!(
                "{} {:.1}°C -> {:.1}°C",
                c.device_id, c.previous_set_point, c.new_set_point
            ),
            Self::State(c) => {
                let mode = c.mode.map_or_else(|| "unknown".to_owned(), |m| m.to_string());
                let mut line = format!("{} mode {mode} set {:.1}°C", c.device_id, c.set_point);
                if let Some(fan) = c.fan_speed {
                    line.push_str(&format!(" fan {fan}"));
                }
                line
            }
            Self::Raw { payload } => payload.to_string(),
        }
    }

    /// One line per event; JSON is always compact here.
    fn render(&self, printer: &Printer) -> Result<String, CliError> {
        match printer.format() {
            OutputFormat::Json | OutputFormat::JsonCompact => output::to_json(self, true),
            OutputFormat::Plain => Ok(self.text()),
            OutputFormat::Table => Ok(format!("{} {}", printer.tag(self.label()), self.text())),
        }
    }
}

/// Pause before resubscribing after the broker connection drops.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

/// A transition that leaves the watched devices without subscriptions.
fn lost_connection(previous: ConnectionStatus, current: ConnectionStatus) -> bool {
    previous != ConnectionStatus::Disconnected && current == ConnectionStatus::Disconnected
}

/// Restart the subscriptions for every watched device. Failures are
/// logged; the next status change triggers another attempt.
async fn resubscribe(ctx: &Context, device_ids: &[String]) {
    warn!(devices = ?device_ids, "realtime connection lost, resubscribing");
    for device_id in device_ids {
        if let Err(e) = ctx.client.restart_realtime_updates(device_id).await {
            warn!(device_id, error = %e, "unable to resubscribe");
        }
    }
}

/// Receive the next event, riding out lag. `None` once the bus is gone.
async fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "watch output fell behind"),
            Err(RecvError::Closed) => return None,
        }
    }
}

pub async fn handle(ctx: &Context, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.ensure_session().await?;
    let result = stream(ctx, args, global).await;

    if let Err(e) = ctx.client.shutdown().await {
        warn!(error = %e, "shutdown did not complete cleanly");
    }
    result
}

async fn stream(ctx: &Context, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Subscribe before starting so the first reports are not missed.
    let events = ctx.client.events();
    let mut status = events.status_changed();
    let mut set_points = events.set_point_changed();
    let mut states = events.state_changed();
    let mut raw = events.raw_message();
    let mut connection = ctx.client.transport().status();

    for device_id in &args.device_ids {
        ctx.client
            .start_realtime_updates(device_id)
            .await
            .map_err(|e| ctx.error(e))?;
    }
    info!(devices = ?args.device_ids, "watching; press Ctrl-C to stop");

    let printer = Printer::new(global);
    let mut last_status = *connection.borrow_and_update();
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = connection.changed() => {
                let current = *connection.borrow_and_update();
                let lost = lost_connection(last_status, current);
                last_status = current;
                if lost {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        () = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
                    }
                    resubscribe(ctx, &args.device_ids).await;
                }
                continue;
            }
            Some(s) = next(&mut status) => WatchEvent::Status(s),
            Some(c) = next(&mut set_points) => WatchEvent::SetPoint(c),
            Some(c) = next(&mut states) => WatchEvent::State(c),
            Some(envelope) = next(&mut raw), if args.raw => WatchEvent::Raw {
                payload: envelope.as_ref().clone().into_value(),
            },
            else => break,
        };
        printer.line(&event.render(&printer)?);
    }
    Ok(())
}
