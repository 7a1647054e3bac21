use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::audit::AuditLogger;
use super::store::{Identity, SessionStore};
use crate::error::{ApiError, ApiResult, ErrorKind};
use crate::transport::{RequestDescriptor, ResponseBody, Transport};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const ME_PATH: &str = "/api/auth/me";

/// How concurrent 401s share renewals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalPolicy {
    /// Every caller that sees a 401 renews on its own. The refresh endpoint
    /// must tolerate concurrent calls.
    #[default]
    Independent,
    /// Renewals are serialized, and a caller whose 401 predates a renewal
    /// that already succeeded replays without renewing again.
    Coalesced,
}

/// Login credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Outcome of a single send.
#[derive(Debug)]
enum Attempt {
    Ok(ResponseBody),
    NeedsRenewal(ApiError),
    Failed(ApiError),
}

/// Steps of one authenticated call. Every path through it sends the request
/// at most twice and renews at most once.
#[derive(Debug)]
enum CallState {
    Sending,
    Unauthorized(ApiError),
    Renewing(ApiError),
    Replaying,
    Done(ResponseBody),
    Failed(ApiError),
}

/// Client for authenticated calls against the dashboard API.
///
/// A 401 on an authenticated call triggers exactly one session renewal
/// followed by exactly one replay of the unchanged request.
#[derive(Clone)]
pub struct SessionedClient {
    transport: Arc<dyn Transport>,
    store: SessionStore,
    policy: RenewalPolicy,
    renewal_lock: Arc<Mutex<()>>,
    audit: AuditLogger,
}

impl std::fmt::Debug for SessionedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionedClient")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SessionedClient {
    pub fn new(transport: Arc<dyn Transport>, store: SessionStore) -> Self {
        Self {
            transport,
            store,
            policy: RenewalPolicy::default(),
            renewal_lock: Arc::new(Mutex::new(())),
            audit: AuditLogger::new(),
        }
    }

    pub fn with_renewal_policy(mut self, policy: RenewalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.store
    }

    /// Plain request without session checks or renewal. Used for the auth
    /// endpoints themselves.
    pub async fn send(&self, request: &RequestDescriptor) -> ApiResult<ResponseBody> {
        let resp = self.transport.send(request).await?;
        if resp.is_success() {
            Ok(resp.into_body())
        } else {
            Err(resp.into_error())
        }
    }

    async fn attempt(&self, request: &RequestDescriptor) -> Attempt {
        match self.transport.send(request).await {
            Ok(resp) if resp.is_success() => Attempt::Ok(resp.into_body()),
            Ok(resp) => {
                let err = resp.into_error();
                if err.kind == ErrorKind::AuthExpired {
                    Attempt::NeedsRenewal(err)
                } else {
                    Attempt::Failed(err)
                }
            }
            Err(err) => Attempt::Failed(err),
        }
    }

    /// Run an authenticated request and return its decoded body.
    ///
    /// Fails with `Unauthenticated` without touching the transport when no
    /// session is held. A 401 renews the session once and replays once; if
    /// the renewal fails the original 401 is returned.
    pub async fn authed_raw(&self, request: &RequestDescriptor) -> ApiResult<ResponseBody> {
        let (identity, generation) = self.store.snapshot().await;
        if identity.is_none() {
            debug!(path = %request.path, "no local session, not sending");
            return Err(ApiError::unauthenticated());
        }

        let mut state = CallState::Sending;
        loop {
            trace!(path = %request.path, state = ?state, "authed call step");
            state = match state {
                CallState::Sending => match self.attempt(request).await {
                    Attempt::Ok(body) => CallState::Done(body),
                    Attempt::NeedsRenewal(err) => CallState::Unauthorized(err),
                    Attempt::Failed(err) => CallState::Failed(err),
                },
                CallState::Unauthorized(original) => {
                    self.audit.auth_expired(&request.path, &request.request_id);
                    if request.is_cancelled() {
                        CallState::Failed(ApiError::cancelled())
                    } else {
                        CallState::Renewing(original)
                    }
                }
                CallState::Renewing(original) => match self.renew_after(&request.path, generation).await {
                    Ok(()) => CallState::Replaying,
                    Err(err) => {
                        let session_age = self.store.age_seconds().await;
                        self.audit
                            .renewal_failed(&request.path, err.status, &err.message, session_age);
                        CallState::Failed(original)
                    }
                },
                CallState::Replaying => match self.attempt(request).await {
                    Attempt::Ok(body) => CallState::Done(body),
                    Attempt::NeedsRenewal(err) | Attempt::Failed(err) => CallState::Failed(err),
                },
                CallState::Done(body) => return Ok(body),
                CallState::Failed(err) => return Err(err),
            };
        }
    }

    /// Typed variant of [`authed_raw`](Self::authed_raw). Empty and
    /// undecodable bodies come back as `None`.
    pub async fn authed_call<T: DeserializeOwned>(&self, request: &RequestDescriptor) -> ApiResult<Option<T>> {
        Ok(self.authed_raw(request).await?.decode())
    }

    /// Renew on behalf of a call that was issued under `observed_generation`.
    async fn renew_after(&self, path: &str, observed_generation: u64) -> ApiResult<()> {
        match self.policy {
            RenewalPolicy::Independent => self.renew_session().await.map(|_| ()),
            RenewalPolicy::Coalesced => {
                let _guard = self.renewal_lock.lock().await;
                let current = self.store.generation().await;
                if current != observed_generation {
                    self.audit.renewal_coalesced(path, current);
                    return Ok(());
                }
                self.renew_session().await.map(|_| ())
            }
        }
    }

    /// Exchange the current (possibly expired) session for a new one.
    pub async fn renew_session(&self) -> ApiResult<Identity> {
        let body = self.send(&RequestDescriptor::post(REFRESH_PATH)).await?;
        let identity: Identity = body
            .decode()
            .ok_or_else(|| ApiError::decode("Refresh returned no identity"))?;
        let generation = self.store.set(identity.clone()).await;
        self.audit.session_renewed(&identity.email, generation);
        Ok(identity)
    }

    pub async fn login(&self, credentials: &Credentials) -> ApiResult<Identity> {
        let request = RequestDescriptor::post(LOGIN_PATH).json(json!({
            "email": credentials.email,
            "password": credentials.password,
        }));
        let body = match self.send(&request).await {
            Ok(body) => body,
            Err(err) => {
                self.audit.login_failed(err.status, &err.message);
                return Err(err);
            }
        };
        let identity: Identity = body
            .decode()
            .ok_or_else(|| ApiError::decode("Login returned no identity"))?;
        self.store.set(identity.clone()).await;
        self.audit.login_succeeded(&identity.email);
        Ok(identity)
    }

    /// Invalidate the session server-side (best effort) and always drop the
    /// local session. A failed server call is still reported.
    pub async fn logout(&self) -> ApiResult<()> {
        let result = self.send(&RequestDescriptor::post(LOGOUT_PATH)).await;
        let identity = self.store.get().await;
        self.store.clear().await;
        self.audit.logged_out(identity.as_ref().map(|i| i.email.as_str()));

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                self.audit.logout_call_failed(&err.message);
                Err(err)
            }
        }
    }

    /// Ask the server who we are. Any failure resolves to anonymous.
    pub async fn restore_session(&self) -> Option<Identity> {
        match self.send(&RequestDescriptor::get(ME_PATH)).await {
            Ok(body) => match body.decode::<Identity>() {
                Some(identity) => {
                    self.store.set(identity.clone()).await;
                    Some(identity)
                }
                None => {
                    self.store.clear().await;
                    None
                }
            },
            Err(err) => {
                warn!(status = err.status, error = %err, "session restore failed, continuing anonymous");
                self.store.clear().await;
                None
            }
        }
    }
}
