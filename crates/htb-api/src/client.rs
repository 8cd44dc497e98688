use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use htb_auth::{
    AuthSession, CachedTokenRecord, CredentialPrompt, Credentials, FileTokenStore, LoginParams,
    NoPrompt, SessionHandle, TokenStore,
};
use htb_core::{ApiRequest, ClientConfig, HtbError, Payload, RequestExecutor, Result};

use crate::entity::{EntityKind, LazyEntity, Lookup};
use crate::user::User;

/// Main client for the Hack The Box API
///
/// Cheap to clone; all clones share one session. When the last clone is
/// dropped the current tokens are written to the configured token store.
#[derive(Clone)]
pub struct HtbClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    executor: RequestExecutor,
    session: SessionHandle,
    store: Option<Arc<dyn TokenStore>>,
    next_download: Mutex<Option<Instant>>,
    current_user: OnceCell<User>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        let record = self.session.get_mut().cached_record();
        if record.credentials().is_none() {
            debug!("No credentials to persist on shutdown");
            return;
        }
        match store.persist(&record) {
            Ok(()) => debug!("Saved tokens to {}", store.location()),
            Err(e) => warn!("Failed to save tokens to {}: {}", store.location(), e),
        }
    }
}

impl HtbClient {
    pub fn builder() -> HtbClientBuilder {
        HtbClientBuilder::new()
    }

    /// Connect with an app token and no token cache
    pub async fn with_app_token(token: impl Into<String>) -> Result<Self> {
        Self::builder().app_token(token).connect().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Execute a raw API request, authorizing it through the session
    pub async fn request(&self, request: &ApiRequest) -> Result<Payload> {
        self.inner
            .executor
            .execute(request, &self.inner.session)
            .await
    }

    /// Authorized GET returning the JSON body
    pub async fn get_json(&self, endpoint: &str) -> Result<Value> {
        self.request(&ApiRequest::get(endpoint)).await?.into_json()
    }

    /// Authorized POST with a JSON body, returning the JSON body
    pub async fn post_json(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.request(&ApiRequest::post(endpoint).json(body))
            .await?
            .into_json()
    }

    /// Fetch the full record of an entity
    #[instrument(skip(self, lookup), fields(kind = K::NAME))]
    pub async fn fetch<K: EntityKind>(&self, lookup: impl Into<Lookup>) -> Result<LazyEntity<K>> {
        let lookup = lookup.into();
        debug!("Fetching {} {}", K::NAME, lookup);
        let body = self.get_json(&K::endpoint(&lookup)).await?;
        LazyEntity::from_record(K::unwrap_response(body)?, false, self.session_ref())
    }

    /// Build summaries from list records
    pub(crate) fn summaries<K: EntityKind>(
        &self,
        records: Vec<Value>,
    ) -> Result<Vec<LazyEntity<K>>> {
        records
            .into_iter()
            .map(|record| LazyEntity::from_record(record, true, self.session_ref()))
            .collect()
    }

    /// The user the client is authenticated as; fetched once
    pub async fn user(&self) -> Result<&User> {
        self.inner
            .current_user
            .get_or_try_init(|| async {
                let info = self.get_json(htb_core::config::endpoints::USER_INFO).await?;
                let id = crate::fields::record_id(&crate::fields::take(info, "info")?)?;
                self.get_user(id).await
            })
            .await
    }

    /// Credential currently in use
    pub async fn credentials(&self) -> Option<Credentials> {
        self.inner.session.lock().await.credentials().cloned()
    }

    /// Current tokens in cache form
    pub async fn cached_record(&self) -> CachedTokenRecord {
        self.inner.session.lock().await.cached_record()
    }

    /// Write the current tokens to the token store now
    pub async fn persist_tokens(&self) -> Result<()> {
        let Some(store) = &self.inner.store else {
            return Ok(());
        };
        let record = self.cached_record().await;
        store.persist(&record)
    }

    /// Non-owning handle for entities created by this client
    pub fn session_ref(&self) -> SessionRef {
        SessionRef(Arc::downgrade(&self.inner))
    }

    /// Claim the challenge download slot, failing if the last download
    /// started less than the cooldown ago
    pub(crate) async fn try_start_download_cooldown(&self) -> Result<()> {
        let mut next = self.inner.next_download.lock().await;
        let now = Instant::now();
        if matches!(*next, Some(at) if at > now) {
            return Err(HtbError::ClientRateLimit(format!(
                "challenge downloads are limited to one every {}s",
                self.inner.config.download_cooldown.as_secs()
            )));
        }
        *next = Some(now + self.inner.config.download_cooldown);
        Ok(())
    }
}

impl std::fmt::Debug for HtbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtbClient")
            .field("api_base", &self.inner.config.api_base.as_str())
            .field(
                "store",
                &self.inner.store.as_ref().map(|store| store.location()),
            )
            .finish_non_exhaustive()
    }
}

/// Weak reference from an entity back to the client that created it
///
/// Entities never keep a client alive; once every [`HtbClient`] clone is
/// dropped, operations that need the network fail with `SessionClosed`.
#[derive(Clone, Default)]
pub struct SessionRef(Weak<ClientInner>);

impl SessionRef {
    /// Reference that is not attached to any client
    pub fn detached() -> Self {
        Self(Weak::new())
    }

    pub fn upgrade(&self) -> Result<HtbClient> {
        self.0
            .upgrade()
            .map(|inner| HtbClient { inner })
            .ok_or(HtbError::SessionClosed)
    }
}

impl std::fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.0.strong_count() > 0 {
            "attached"
        } else {
            "closed"
        };
        write!(f, "SessionRef({state})")
    }
}

/// Builder that authenticates and returns a connected [`HtbClient`]
///
/// With a token store, cached tokens are tried first: an expired access token
/// is refreshed, and only if that is rejected does a fresh login happen.
pub struct HtbClientBuilder {
    config: ClientConfig,
    params: LoginParams,
    store: Option<Arc<dyn TokenStore>>,
    prompt: Arc<dyn CredentialPrompt>,
}

impl Default for HtbClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HtbClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            params: LoginParams::default(),
            store: None,
            prompt: Arc::new(NoPrompt),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Point the client at another API base
    pub fn api_base(mut self, api_base: &str) -> Result<Self> {
        self.config.api_base = ClientConfig::with_api_base(api_base)?.api_base;
        Ok(self)
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.params = self.params.with_email(email);
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.params = self.params.with_password(password);
        self
    }

    pub fn otp(mut self, otp: impl Into<String>) -> Self {
        self.params = self.params.with_otp(otp);
        self
    }

    /// Ask for a long-lived "remember me" token pair
    pub fn remember(mut self, remember: bool) -> Self {
        self.params = self.params.remember(remember);
        self
    }

    pub fn app_token(mut self, token: impl Into<String>) -> Self {
        self.params = self.params.with_app_token(token);
        self
    }

    /// Cache tokens in a JSON file at `path`
    pub fn cache(self, path: impl AsRef<Path>) -> Self {
        self.token_store(FileTokenStore::new(path))
    }

    pub fn token_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Where missing login details come from; defaults to [`NoPrompt`]
    pub fn prompt(mut self, prompt: impl CredentialPrompt + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    /// Authenticate and build the client
    #[instrument(skip(self))]
    pub async fn connect(self) -> Result<HtbClient> {
        let executor = RequestExecutor::new(&self.config)?;

        let restored = match &self.store {
            Some(store) => restore(store.as_ref(), &executor).await?,
            None => None,
        };

        let session = match restored {
            Some(session) => session,
            None => {
                let mut session = AuthSession::new();
                session
                    .login(&executor, self.params, self.prompt.as_ref())
                    .await?;
                if let Some(store) = &self.store {
                    if let Err(e) = store.persist(&session.cached_record()) {
                        warn!("Failed to save tokens to {}: {}", store.location(), e);
                    }
                }
                session
            }
        };

        Ok(HtbClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                executor,
                session: SessionHandle::new(session),
                store: self.store,
                next_download: Mutex::new(None),
                current_user: OnceCell::new(),
            }),
        })
    }
}

/// Session from cached tokens, refreshed if needed
///
/// `None` means the cache is absent or its tokens were rejected.
async fn restore(store: &dyn TokenStore, executor: &RequestExecutor) -> Result<Option<AuthSession>> {
    let Some(record) = store.load() else {
        debug!("No cached tokens in {}", store.location());
        return Ok(None);
    };

    let mut session = AuthSession::from_record(&record);
    match session.ensure_fresh(executor).await {
        Ok(()) => {
            info!("Restored session from {}", store.location());
            Ok(Some(session))
        }
        Err(e) if e.is_authentication() => {
            warn!("Cached tokens rejected, logging in again: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
