//! Session manager: open / keep-alive / close state machine.
//!
//! State is published through a `watch` channel. Every transition happens
//! while holding the `core` lock, so there is exactly one writer at a time.
//! Open attempts are additionally serialised by `open_lock`; callers that
//! queue behind an attempt receive that attempt's outcome.

use crate::config::ClientConfig;
use crate::crypto::KdfParams;
use crate::session::challenge::{self, Challenge, OpenSecret};
use crate::session::credentials::MasterPasswordStore;
use crate::session::keepalive::{KeepAlivePolicy, KeepAliveStep, KeepAliveTracker};
use crate::session::keychain::{self, Keychain, KeychainEnvelope};
use crate::session::state::{OpenOutcome, Session, SessionState};
use crate::transport::{Transport, TransportError};
use crate::{Result, VaultError};
use secrecy::SecretString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session behaviour taken from [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub keep_alive: KeepAlivePolicy,
    pub remember_master_password: bool,
    pub purge_password_on_deauthorization: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            keep_alive: KeepAlivePolicy::from_config(config),
            remember_master_password: config.remember_master_password,
            purge_password_on_deauthorization: config.purge_password_on_deauthorization,
        }
    }
}

struct Core {
    session: Option<Session>,
    keychain: Arc<Keychain>,
    /// Challenge kept while waiting for the master password.
    pending_challenge: Option<Challenge>,
    /// Bumped whenever a session is opened or torn down; keep-alive tasks
    /// from an older epoch never write state.
    epoch: u64,
    keep_alive: Option<CancellationToken>,
    last_outcome: OpenOutcome,
}

struct Inner {
    transport: Arc<dyn Transport>,
    passwords: Arc<dyn MasterPasswordStore>,
    settings: SessionSettings,
    kdf: KdfParams,
    state: watch::Sender<SessionState>,
    core: Mutex<Core>,
    open_lock: Mutex<()>,
    /// Number of finished open attempts.
    attempts: AtomicU64,
}

/// Owns the server session and the decrypted keychain.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        passwords: Arc<dyn MasterPasswordStore>,
        settings: SessionSettings,
    ) -> Self {
        Self::with_kdf_params(transport, passwords, settings, KdfParams::interactive())
    }

    /// Construct with explicit KDF parameters. Servers expect the
    /// interactive cost; anything else is only useful against test doubles.
    pub fn with_kdf_params(
        transport: Arc<dyn Transport>,
        passwords: Arc<dyn MasterPasswordStore>,
        settings: SessionSettings,
        kdf: KdfParams,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Closed);
        Self {
            inner: Arc::new(Inner {
                transport,
                passwords,
                settings,
                kdf,
                state,
                core: Mutex::new(Core {
                    session: None,
                    keychain: Arc::new(Keychain::empty()),
                    pending_challenge: None,
                    epoch: 0,
                    keep_alive: None,
                    last_outcome: OpenOutcome::Failed(VaultError::NoSession),
                }),
                open_lock: Mutex::new(()),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn current_state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The keychain of the current (or last) session.
    pub async fn keychain(&self) -> Arc<Keychain> {
        self.inner.core.lock().await.keychain.clone()
    }

    /// Session code for entity operations. Fails with
    /// [`VaultError::NoSession`] unless the state is exactly `Open`.
    pub async fn require_open(&self) -> Result<String> {
        let core = self.inner.core.lock().await;
        match (&core.session, self.current_state()) {
            (Some(session), SessionState::Open) => Ok(session.code.clone()),
            _ => Err(VaultError::NoSession),
        }
    }

    /// Open a session, or join the attempt already in flight.
    ///
    /// Without an explicit password the remembered one (if any) is used.
    /// The attempt runs on its own task: dropping the returned future does
    /// not abandon it, and later callers still receive its outcome.
    pub async fn open_session(&self, master_password: Option<SecretString>) -> OpenOutcome {
        let this = self.clone();
        match tokio::spawn(async move { this.run_open(master_password).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Open task failed: {}", e);
                let core = self.inner.core.lock().await;
                if self.current_state().is_transitioning() {
                    self.inner.set_state(&core, SessionState::Closed);
                }
                OpenOutcome::Failed(VaultError::Io(format!("Open task failed: {}", e)))
            }
        }
    }

    async fn run_open(&self, master_password: Option<SecretString>) -> OpenOutcome {
        let seen = self.inner.attempts.load(Ordering::SeqCst);
        let _attempt = self.inner.open_lock.lock().await;

        if self.inner.attempts.load(Ordering::SeqCst) != seen {
            let shared = self.inner.core.lock().await.last_outcome.clone();
            // A caller bringing the missing password must not be turned away
            // by the outcome that asked for it.
            if !(shared == OpenOutcome::NeedsMasterKey && master_password.is_some()) {
                debug!("Joining outcome of concurrent open attempt");
                return shared;
            }
        }

        let outcome = match self.current_state() {
            SessionState::Open => OpenOutcome::Opened,
            SessionState::Deauthorized => OpenOutcome::Deauthorized,
            _ => self.attempt(master_password).await,
        };

        self.inner.core.lock().await.last_outcome = outcome.clone();
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn attempt(&self, master_password: Option<SecretString>) -> OpenOutcome {
        let password = master_password.or_else(|| self.inner.passwords.load());

        let pending = self.inner.core.lock().await.pending_challenge.take();
        let challenge = match pending {
            Some(challenge) => {
                debug!("Resuming pending challenge");
                challenge
            }
            None => {
                if !self.inner.transition(SessionState::RequestingChallenge).await {
                    return OpenOutcome::Deauthorized;
                }
                match self.inner.transport.request_challenge().await {
                    Ok(challenge) => challenge,
                    Err(TransportError::Status(401 | 403)) => {
                        self.inner.deauthorize().await;
                        return OpenOutcome::Deauthorized;
                    }
                    Err(e) => return self.inner.fail(e.into()).await,
                }
            }
        };

        if !self.inner.transition(SessionState::Solving).await {
            return OpenOutcome::Deauthorized;
        }
        let secret = match self.solve(&challenge, password.clone()).await {
            Ok(secret) => secret,
            Err(VaultError::NeedsMasterKey) => {
                info!("Master password required to open session");
                let mut core = self.inner.core.lock().await;
                core.pending_challenge = Some(challenge);
                self.inner.set_state(&core, SessionState::NeedsMasterKey);
                return OpenOutcome::NeedsMasterKey;
            }
            Err(e) => return self.inner.fail(e).await,
        };

        if !self.inner.transition(SessionState::Opening).await {
            return OpenOutcome::Deauthorized;
        }
        let opened = match self.inner.transport.open_session(secret.as_str()).await {
            Ok(opened) => opened,
            Err(TransportError::Status(401)) => return self.inner.reject_password().await,
            Err(TransportError::Status(403)) => {
                self.inner.deauthorize().await;
                return OpenOutcome::Deauthorized;
            }
            Err(e) => return self.inner.fail(e.into()).await,
        };

        let Some(code) = opened.session_code else {
            return self
                .inner
                .fail(VaultError::BadResponse("Session opened without a code".to_string()))
                .await;
        };

        let keychain = match (opened.keychain, &password) {
            (Some(envelope), Some(password)) => {
                match self.decrypt_keychain(envelope, password.clone()).await {
                    Ok(keychain) => keychain,
                    Err(e) => {
                        self.inner.close_remote(&code).await;
                        return match e {
                            VaultError::InvalidMasterKey => self.inner.reject_password().await,
                            other => self.inner.fail(other).await,
                        };
                    }
                }
            }
            _ => Keychain::empty(),
        };

        let mut core = self.inner.core.lock().await;
        if self.current_state() == SessionState::Deauthorized {
            drop(core);
            self.inner.close_remote(&code).await;
            return OpenOutcome::Deauthorized;
        }

        if let (true, Some(password)) = (self.inner.settings.remember_master_password, password) {
            self.inner.passwords.store(password);
        }

        core.epoch += 1;
        core.session = Some(Session::new(code));
        core.keychain = Arc::new(keychain);
        let token = CancellationToken::new();
        if let Some(previous) = core.keep_alive.replace(token.clone()) {
            previous.cancel();
        }
        let policy = self.inner.settings.keep_alive.for_lifetime(opened.lifetime);
        tokio::spawn(keep_alive_loop(
            Arc::downgrade(&self.inner),
            core.epoch,
            token,
            policy,
        ));

        self.inner.set_state(&core, SessionState::Open);
        info!(keys = core.keychain.len(), "Session opened");
        OpenOutcome::Opened
    }

    async fn solve(&self, challenge: &Challenge, password: Option<SecretString>) -> Result<OpenSecret> {
        if !challenge.requires_password() {
            return Ok(OpenSecret::default());
        }
        let kdf = self.inner.kdf;
        let challenge = challenge.clone();
        tokio::task::spawn_blocking(move || challenge::solve_with(&kdf, &challenge, password.as_ref()))
            .await
            .map_err(|e| VaultError::Io(format!("Challenge task failed: {}", e)))?
    }

    async fn decrypt_keychain(
        &self,
        envelope: KeychainEnvelope,
        password: SecretString,
    ) -> Result<Keychain> {
        let kdf = self.inner.kdf;
        tokio::task::spawn_blocking(move || keychain::decrypt_envelope_with(&kdf, &envelope, &password))
            .await
            .map_err(|e| VaultError::Io(format!("Keychain task failed: {}", e)))?
    }

    /// Close the session. The close request is best effort; locally the
    /// session is closed and the keychain discarded regardless.
    pub async fn close(&self) {
        let _attempt = self.inner.open_lock.lock().await;

        let code = {
            let mut core = self.inner.core.lock().await;
            let code = self.inner.tear_down(&mut core).map(|s| s.code);
            core.keychain = Arc::new(Keychain::empty());
            core.pending_challenge = None;
            if code.is_some() {
                self.inner.set_state(&core, SessionState::Closing);
            }
            code
        };

        if let Some(code) = code {
            self.inner.close_remote(&code).await;
        }

        let core = self.inner.core.lock().await;
        self.inner.set_state(&core, SessionState::Closed);
        info!("Session closed");
    }

    /// Close the session and forget the remembered master password.
    pub async fn logout(&self) {
        self.close().await;
        self.inner.passwords.forget();
    }

    /// React to a transport failure seen outside the session manager.
    ///
    /// 403 revokes the client; 401 means the server no longer knows the
    /// session `session_code`, which is closed locally if it is still the
    /// current one.
    pub async fn report_transport_error(&self, error: &TransportError, session_code: &str) {
        match error.status() {
            Some(403) => self.inner.deauthorize().await,
            Some(401) => {
                let mut core = self.inner.core.lock().await;
                let current = core.session.as_ref().is_some_and(|s| s.code == session_code);
                if !current {
                    debug!("Ignoring 401 for a session that is no longer current");
                    return;
                }
                if self.inner.tear_down(&mut core).is_some() {
                    warn!("Server rejected session code; session closed");
                    self.inner.set_state(&core, SessionState::Closed);
                }
            }
            _ => {}
        }
    }

    /// Mark the client deauthorized from any state.
    pub async fn mark_deauthorized(&self) {
        self.inner.deauthorize().await;
    }

    /// Leave `Deauthorized` after the user logged in again with fresh credentials.
    pub async fn reset_after_relogin(&self) {
        let mut core = self.inner.core.lock().await;
        if self.current_state() == SessionState::Deauthorized {
            core.last_outcome = OpenOutcome::Failed(VaultError::NoSession);
            self.inner.state.send_replace(SessionState::Closed);
            info!("Deauthorization cleared after re-login");
        }
    }
}

impl Inner {
    /// Publish `next` unless the client is deauthorized. Caller holds `core`.
    fn set_state(&self, _core: &Core, next: SessionState) -> bool {
        let current = *self.state.borrow();
        if current == SessionState::Deauthorized && next != SessionState::Deauthorized {
            return false;
        }
        if current != next {
            debug!(from = %current, to = %next, "Session state");
            self.state.send_replace(next);
        }
        true
    }

    async fn transition(&self, next: SessionState) -> bool {
        let core = self.core.lock().await;
        self.set_state(&core, next)
    }

    /// Cancel keep-alive and drop the session. Caller holds `core`.
    fn tear_down(&self, core: &mut Core) -> Option<Session> {
        core.epoch += 1;
        if let Some(token) = core.keep_alive.take() {
            token.cancel();
        }
        core.session.take()
    }

    async fn fail(&self, error: VaultError) -> OpenOutcome {
        if error == VaultError::Deauthorized {
            self.deauthorize().await;
            return OpenOutcome::Deauthorized;
        }
        warn!("Session open failed: {}", error);
        let core = self.core.lock().await;
        if self.set_state(&core, SessionState::Closed) {
            OpenOutcome::Failed(error)
        } else {
            OpenOutcome::Deauthorized
        }
    }

    async fn reject_password(&self) -> OpenOutcome {
        warn!("Master password rejected");
        self.passwords.forget();
        let mut core = self.core.lock().await;
        core.keychain = Arc::new(Keychain::empty());
        if self.set_state(&core, SessionState::Closed) {
            OpenOutcome::InvalidMasterKey
        } else {
            OpenOutcome::Deauthorized
        }
    }

    async fn deauthorize(&self) {
        let mut core = self.core.lock().await;
        self.tear_down(&mut core);
        core.keychain = Arc::new(Keychain::empty());
        core.pending_challenge = None;
        if self.settings.purge_password_on_deauthorization {
            self.passwords.forget();
        }
        if *self.state.borrow() != SessionState::Deauthorized {
            warn!("Client deauthorized by server");
            self.set_state(&core, SessionState::Deauthorized);
        }
    }

    async fn close_remote(&self, code: &str) {
        if let Err(e) = self.transport.close_session(code).await {
            debug!("Best-effort session close failed: {}", e);
        }
    }

    /// Session code for the keep-alive task of `epoch`, if still current.
    async fn code_for(&self, epoch: u64) -> Option<String> {
        let core = self.core.lock().await;
        (core.epoch == epoch)
            .then(|| core.session.as_ref().map(|s| s.code.clone()))
            .flatten()
    }

    async fn expire(&self, epoch: u64) {
        let mut core = self.core.lock().await;
        if core.epoch != epoch {
            return;
        }
        self.tear_down(&mut core);
        warn!("Keep-alive failed repeatedly; session closed");
        self.set_state(&core, SessionState::Closed);
    }

    async fn deauthorize_from(&self, epoch: u64) {
        if self.core.lock().await.epoch == epoch {
            self.deauthorize().await;
        }
    }
}

async fn keep_alive_loop(
    inner: Weak<Inner>,
    epoch: u64,
    token: CancellationToken,
    policy: KeepAlivePolicy,
) {
    let mut tracker = KeepAliveTracker::new(policy);
    let mut delay = policy.interval;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(inner) = inner.upgrade() else { return };
        let Some(code) = inner.code_for(epoch).await else { return };

        let result = inner.transport.keep_alive(&code).await;
        if token.is_cancelled() {
            return;
        }

        match tracker.record(&result) {
            KeepAliveStep::Continue(next) => delay = next,
            KeepAliveStep::Retry(next) => {
                warn!(
                    failures = tracker.failures(),
                    "Keep-alive failed, retrying in {:?}", next
                );
                delay = next;
            }
            KeepAliveStep::Expire => {
                inner.expire(epoch).await;
                return;
            }
            KeepAliveStep::Deauthorize => {
                inner.deauthorize_from(epoch).await;
                return;
            }
        }
    }
}
