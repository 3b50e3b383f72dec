//! Shared helpers for command handlers.

use std::io::IsTerminal;

use secrecy::SecretString;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mysa_core::{MysaClient, Session};

use crate::cli::GlobalOpts;
use crate::config::{self, Resolved};
use crate::error::CliError;

/// A client bound to the active profile and its session file.
pub struct Context {
    pub client: MysaClient,
    pub resolved: Resolved,
    persist_task: JoinHandle<()>,
}

impl Context {
    /// Build a client for the active profile, restoring any saved session.
    pub fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let resolved = config::resolve(global)?;

        let mut builder = MysaClient::builder(resolved.client_config.clone());
        if let Some(session) = mysa_config::load_session(&resolved.session_path)? {
            debug!(username = %session.username, "restoring saved session");
            builder = builder.session(session);
        }
        let client = builder.build()?;

        let persist_task = spawn_session_writer(&client, &resolved);
        Ok(Self {
            client,
            resolved,
            persist_task,
        })
    }

    pub fn profile_name(&self) -> &str {
        &self.resolved.profile_name
    }

    /// Make sure there is a session, logging in from the stored
    /// credentials when nothing was restored.
    pub async fn ensure_session(&self) -> Result<(), CliError> {
        if self.client.is_authenticated() {
            return Ok(());
        }
        let username = mysa_config::resolve_username(&self.resolved.profile, self.profile_name())?;
        let password = mysa_config::resolve_password(&self.resolved.profile, self.profile_name())?;
        self.login(&username, &password).await
    }

    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), CliError> {
        self.client
            .login(username, password)
            .await
            .map_err(|e| CliError::from(e).with_profile(self.profile_name()))
    }

    /// Write the current session to disk and stop the background writer.
    pub fn finish(self) -> Result<(), CliError> {
        self.persist_task.abort();
        match self.client.session() {
            Some(session) => mysa_config::save_session(&self.resolved.session_path, &session)?,
            None => mysa_config::remove_session(&self.resolved.session_path)?,
        }
        Ok(())
    }

    /// Map a core error, naming the active profile in auth help text.
    pub fn error(&self, err: mysa_core::CoreError) -> CliError {
        CliError::from(err).with_profile(self.profile_name())
    }
}

/// Persist every session change so refreshed tokens survive long runs.
fn spawn_session_writer(client: &MysaClient, resolved: &Resolved) -> JoinHandle<()> {
    let mut changes = client.events().session_changed();
    let path = resolved.session_path.clone();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(Some(session)) => write_session(&path, &session),
                // Login clears before it installs; finish() handles logout.
                Ok(None) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "session writer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn write_session(path: &std::path::Path, session: &Session) {
    if let Err(e) = mysa_config::save_session(path, session) {
        warn!(error = %e, path = %path.display(), "failed to persist session");
    }
}

/// Prompt for a password when attached to a terminal.
pub fn prompt_password(username: &str) -> Result<Option<SecretString>, CliError> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let pw = rpassword::prompt_password(format!("Password for {username}: "))?;
    Ok(Some(SecretString::from(pw)))
}
