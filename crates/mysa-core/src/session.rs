// ── Session management ──
//
// Holds the authenticated user and their token set, hands out fresh
// tokens to every authenticated call, and refreshes them when they
// expire. Refreshes are single-flight: the async gate is held across the
// token exchange so concurrent callers wait for one refresh instead of
// racing several. Every write to the stored state bumps a generation
// counter; a refresh only commits if no `clear` or `restore` happened
// while it was in flight.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use mysa_api::{Authenticator, TokenSet};

use crate::error::CoreError;
use crate::events::EventBus;

// ── Clock ────────────────────────────────────────────────────────────

/// Source of "now" for token expiry and command timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// A serializable snapshot of the authenticated session.
///
/// This is what callers persist between runs and hand back to
/// [`SessionManager::restore`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("id_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
struct AuthState {
    username: String,
    tokens: TokenSet,
}

impl AuthState {
    fn snapshot(&self) -> Session {
        Session {
            username: self.username.clone(),
            id_token: self.tokens.id_token.expose_secret().to_owned(),
            access_token: self.tokens.access_token.expose_secret().to_owned(),
            refresh_token: self.tokens.refresh_token.expose_secret().to_owned(),
        }
    }
}

// ── SessionManager ───────────────────────────────────────────────────

pub struct SessionManager {
    authenticator: Arc<dyn Authenticator>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    state: RwLock<Option<AuthState>>,
    generation: AtomicU64,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(authenticator: Arc<dyn Authenticator>, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            authenticator,
            events,
            clock,
            state: RwLock::new(None),
            generation: AtomicU64::new(0),
            refresh_gate: Mutex::new(()),
        }
    }

    /// The current session, without any I/O.
    pub fn current_snapshot(&self) -> Option<Session> {
        self.read_state().as_ref().map(AuthState::snapshot)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_some()
    }

    pub fn username(&self) -> Option<String> {
        self.read_state().as_ref().map(|s| s.username.clone())
    }

    /// Authenticate with a password, replacing any existing session.
    ///
    /// Listeners see `None` as the login starts and `Some` once it
    /// succeeds. On failure the manager is left unauthenticated.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), CoreError> {
        let _gate = self.refresh_gate.lock().await;

        self.write_state(None);
        self.events.emit_session_changed(None);

        let tokens = self.authenticator.authenticate(username, password).await?;
        let state = AuthState {
            username: username.to_owned(),
            tokens,
        };
        let snapshot = state.snapshot();
        self.write_state(Some(state));
        info!(username, "logged in");
        self.events.emit_session_changed(Some(snapshot));
        Ok(())
    }

    /// Rebuild the session from a persisted snapshot.
    ///
    /// The expiry comes from the JWT `exp` claims. Tokens whose claims
    /// cannot be read count as expired and are refreshed on first use.
    pub fn restore(&self, session: Session) {
        let tokens = TokenSet::from_jwts(
            session.id_token,
            session.access_token,
            session.refresh_token,
            None,
        );
        debug!(username = %session.username, expires_at = %tokens.expires_at, "session restored");
        self.write_state(Some(AuthState {
            username: session.username,
            tokens,
        }));
    }

    /// Forget the session and notify listeners.
    pub fn clear(&self) {
        self.write_state(None);
        self.events.emit_session_changed(None);
    }

    /// A token set that is valid right now, refreshing first if needed.
    ///
    /// A failed refresh yields `Unauthenticated` but keeps the stored
    /// session, so the caller can still read the username.
    pub async fn fresh_token_set(&self) -> Result<TokenSet, CoreError> {
        if let Some(tokens) = self.valid_tokens()? {
            return Ok(tokens);
        }

        let _gate = self.refresh_gate.lock().await;

        // Another caller may have refreshed while we waited on the gate.
        let (username, refresh_token, generation) = {
            let guard = self.read_state();
            let state = guard.as_ref().ok_or_else(no_session)?;
            if state.tokens.is_valid_at(self.clock.now()) {
                return Ok(state.tokens.clone());
            }
            (
                state.username.clone(),
                state.tokens.refresh_token.clone(),
                self.generation.load(Ordering::SeqCst),
            )
        };

        debug!(username = %username, "session expired, refreshing");
        match self.authenticator.refresh(&username, &refresh_token).await {
            Ok(tokens) => {
                let state = AuthState {
                    username,
                    tokens: tokens.clone(),
                };
                let snapshot = state.snapshot();
                if !self.commit_refresh(generation, state) {
                    warn!("session was replaced during refresh, discarding new tokens");
                    return Err(CoreError::unauthenticated(
                        "The session changed while it was being refreshed.",
                    ));
                }
                self.events.emit_session_changed(Some(snapshot));
                Ok(tokens)
            }
            Err(e) => {
                error!(error = %e, "unable to refresh the session");
                Err(CoreError::unauthenticated(
                    "Unable to refresh the authentication session.",
                ))
            }
        }
    }

    fn valid_tokens(&self) -> Result<Option<TokenSet>, CoreError> {
        let guard = self.read_state();
        let state = guard.as_ref().ok_or_else(no_session)?;
        Ok(state
            .tokens
            .is_valid_at(self.clock.now())
            .then(|| state.tokens.clone()))
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, Option<AuthState>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self, state: Option<AuthState>) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = state;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Store refreshed tokens unless the state was rewritten since
    /// `generation` was read.
    fn commit_refresh(&self, generation: u64, state: AuthState) -> bool {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        *guard = Some(state);
        self.generation.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn no_session() -> CoreError {
    CoreError::unauthenticated("An attempt was made to access a resource without a valid session.")
}
