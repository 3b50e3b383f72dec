//! `login` and `logout`.

use secrecy::ExposeSecret;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::error::CliError;
use crate::output::Printer;

use super::util::{self, Context};

pub async fn login(ctx: &Context, args: &LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let profile = &ctx.resolved.profile;
    let name = ctx.profile_name();

    let username = mysa_config::resolve_username(profile, name)?;
    let password = match mysa_config::resolve_password(profile, name) {
        Ok(pw) => pw,
        Err(mysa_config::ConfigError::NoCredentials { .. }) => util::prompt_password(&username)?
            .ok_or_else(|| CliError::NoCredentials {
                what: "password".into(),
                profile: name.to_owned(),
            })?,
        Err(e) => return Err(e.into()),
    };

    ctx.login(&username, &password).await?;

    if args.save_password {
        mysa_config::store_password(name, password.expose_secret())?;
        tracing::info!(profile = name, "password stored in keyring");
    }

    Printer::new(global).done(&format!("Logged in as {username}"));
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
pub fn logout(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    ctx.client.logout();
    Printer::new(global).done("Logged out");
    Ok(())
}
