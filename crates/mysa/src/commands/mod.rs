//! Command dispatch: bridges CLI args -> client calls -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod login;
pub mod serial;
pub mod set;
pub mod states;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

use util::Context;

/// Dispatch an account-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = Context::open(global)?;

    let result = match cmd {
        Command::Login(args) => login::login(&ctx, &args, global).await,
        Command::Logout => login::logout(&ctx, global),
        Command::Devices => devices::list(&ctx, global).await,
        Command::Firmware => devices::firmware(&ctx, global).await,
        Command::States => states::handle(&ctx, global).await,
        Command::Serial(args) => serial::handle(&ctx, args, global).await,
        Command::Set(args) => set::handle(&ctx, &args, global).await,
        Command::Watch(args) => watch::handle(&ctx, &args, global).await,
        Command::Config(ref config) => config_cmd::handle(config, global),
    };

    // Persist whatever session we ended with, even on failure.
    let saved = ctx.finish();
    result.and(saved)
}
