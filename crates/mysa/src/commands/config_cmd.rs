//! `config` subcommands. These never touch the network.

use serde::Serialize;

use mysa_config::Profile;

use crate::cli::{ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output::Printer;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Paths {
    config: String,
    session: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShownProfile {
    name: String,
    #[serde(flatten)]
    profile: Profile,
}

pub fn handle(command: &ConfigCommand, global: &GlobalOpts) -> Result<(), CliError> {
    match command {
        ConfigCommand::Path => path(global),
        ConfigCommand::Show => show(global),
    }
}

fn path(global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let paths = Paths {
        config: resolved.config_path.display().to_string(),
        session: resolved.session_path.display().to_string(),
    };
    Printer::new(global).item(
        &paths,
        |p| format!("Config:   {}\nSession:  {}", p.config, p.session),
        |p| p.config.clone(),
    )
}

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let mut profile = resolved.profile;
    if profile.password.is_some() {
        profile.password = Some("********".into());
    }
    let shown = ShownProfile {
        name: resolved.profile_name,
        profile,
    };
    let cfg = &resolved.client_config;
    Printer::new(global).item(
        &shown,
        |s| {
            [
                format!("Profile:       {}", s.name),
                format!("Username:      {}", s.profile.username.as_deref().unwrap_or("-")),
                format!("API:           {}", cfg.api_base_url),
                format!("Region:        {}", cfg.region),
                format!("IoT endpoint:  {}", cfg.iot_endpoint),
                format!("HTTP timeout:  {}s", cfg.http_timeout.as_secs()),
                format!("Status window: {}s", cfg.realtime.status_timeout.as_secs()),
            ]
            .join("\n")
        },
        |s| s.name.clone(),
    )
}
