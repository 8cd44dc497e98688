use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use htb_core::config::endpoints;
use htb_core::{ApiRequest, Authorizer, HtbError, RequestExecutor, Result};

use crate::credentials::{CachedTokenRecord, Credentials};
use crate::jwt;
use crate::models::{Envelope, LoginRequest, Message, OtpRequest, RefreshRequest, TokenMessage};
use crate::prompt::CredentialPrompt;

/// Explicit login details; anything missing is asked of the [`CredentialPrompt`]
#[derive(Default)]
pub struct LoginParams {
    pub email: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub otp: Option<String>,
    pub remember: bool,
    pub app_token: Option<String>,
}

impl LoginParams {
    pub fn app_token(token: impl Into<String>) -> Self {
        Self {
            app_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(Zeroizing::new(password.into())),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn with_app_token(mut self, token: impl Into<String>) -> Self {
        self.app_token = Some(token.into());
        self
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }

    /// Numeric OTP; rendered zero-padded to six digits
    pub fn with_otp_code(mut self, otp: u32) -> Self {
        self.otp = Some(format!("{otp:06}"));
        self
    }

    pub fn remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }
}

impl std::fmt::Debug for LoginParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginParams")
            .field("email", &self.email)
            .field("remember", &self.remember)
            .field("app_token", &self.app_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Credential state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    LoggedIn(Credentials),
    /// Login or refresh was rejected; only a fresh login recovers
    Failed(String),
}

/// Owns login, two-factor and refresh-on-expiry decisions
#[derive(Debug, Clone)]
pub struct AuthSession {
    state: SessionState,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
        }
    }

    /// Restore a session from cached tokens
    pub fn from_record(record: &CachedTokenRecord) -> Self {
        Self {
            state: record
                .credentials()
                .map_or(SessionState::Uninitialized, SessionState::LoggedIn),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match &self.state {
            SessionState::LoggedIn(credentials) => Some(credentials),
            _ => None,
        }
    }

    /// Current tokens in their persisted form
    pub fn cached_record(&self) -> CachedTokenRecord {
        self.credentials()
            .map(CachedTokenRecord::from)
            .unwrap_or_default()
    }

    /// Authenticate against the API
    ///
    /// An app token is used as-is without any network call. Otherwise missing
    /// email and password are requested from `prompt`, and a second round-trip
    /// submits the OTP when the account has two-factor enabled.
    #[instrument(skip(self, executor, params, prompt))]
    pub async fn login(
        &mut self,
        executor: &RequestExecutor,
        params: LoginParams,
        prompt: &dyn CredentialPrompt,
    ) -> Result<&Credentials> {
        if let Some(token) = params.app_token {
            debug!("Using app token, skipping login exchange");
            self.state = SessionState::LoggedIn(Credentials::App(token));
            return self.logged_in();
        }

        let email = match params.email {
            Some(email) => email,
            None => prompt.email().await.ok_or(HtbError::MissingEmail)?,
        };
        let password = match params.password {
            Some(password) => password,
            None => prompt.password().await.ok_or(HtbError::MissingPassword)?,
        };

        let body = serde_json::to_value(LoginRequest {
            email: &email,
            password: password.as_str(),
            remember: params.remember,
        })?;
        let request = ApiRequest::get(endpoints::LOGIN).json(body).unauthorized();

        debug!("Logging in as {}", email);
        let response = self.guard(executor.dispatch(&request, HeaderMap::new()).await)?;
        let message: TokenMessage = match parse_envelope(response)? {
            Message::Data(message) => message,
            Message::Text(text) => return Err(self.fail(HtbError::Authentication(text))),
        };

        let access = message
            .access_token
            .ok_or_else(|| HtbError::Api("Failed to get access token".to_string()))?;
        let refresh = message
            .refresh_token
            .ok_or_else(|| HtbError::Api("Failed to get refresh token".to_string()))?;
        self.state = SessionState::LoggedIn(Credentials::Jwt { access, refresh });

        if message.two_factor_enabled {
            let otp = match params.otp {
                Some(otp) => otp,
                None => match prompt.otp().await {
                    Some(otp) => otp,
                    None => return Err(self.fail(HtbError::MissingOtp)),
                },
            };
            self.submit_otp(executor, &normalize_otp(&otp)).await?;
        }

        info!("Logged in");
        self.logged_in()
    }

    async fn submit_otp(&mut self, executor: &RequestExecutor, otp: &str) -> Result<()> {
        let body = serde_json::to_value(OtpRequest {
            one_time_password: otp,
        })?;
        let request = ApiRequest::get(endpoints::TWO_FACTOR).json(body);

        debug!("Submitting two-factor code");
        let headers = self.headers()?;
        let response = self.guard(executor.dispatch(&request, headers).await)?;
        let accepted = match parse_envelope::<Value>(response)? {
            Message::Text(text) => otp_accepted(&text),
            Message::Data(_) => false,
        };

        if accepted {
            Ok(())
        } else {
            Err(self.fail(HtbError::IncorrectOtp))
        }
    }

    /// Refresh the access token if it has expired
    ///
    /// App tokens are never refreshed. A token that cannot be decoded is an error.
    pub async fn ensure_fresh(&mut self, executor: &RequestExecutor) -> Result<()> {
        match &self.state {
            SessionState::LoggedIn(Credentials::App(_)) => Ok(()),
            SessionState::LoggedIn(Credentials::Jwt { access, .. }) => {
                if jwt::is_expired(access)? {
                    self.refresh(executor).await
                } else {
                    Ok(())
                }
            }
            _ => Err(no_tokens()),
        }
    }

    /// Exchange the refresh token for a new token pair
    #[instrument(skip(self, executor))]
    pub async fn refresh(&mut self, executor: &RequestExecutor) -> Result<()> {
        let refresh_token = match &self.state {
            SessionState::LoggedIn(Credentials::Jwt { refresh, .. }) => refresh.clone(),
            SessionState::LoggedIn(Credentials::App(_)) => return Ok(()),
            _ => return Err(no_tokens()),
        };

        let body = serde_json::to_value(RefreshRequest {
            refresh_token: &refresh_token,
        })?;
        let request = ApiRequest::get(endpoints::REFRESH).json(body).unauthorized();

        debug!("Refreshing access token");
        let response = self.guard(executor.dispatch(&request, HeaderMap::new()).await)?;
        let message = match parse_envelope::<TokenMessage>(response) {
            Ok(Message::Data(message)) => message,
            Ok(Message::Text(text)) => {
                warn!("Refresh rejected: {}", text);
                return Err(self.fail(HtbError::Authentication(text)));
            }
            Err(e) => {
                return Err(self.fail(HtbError::Authentication(format!(
                    "unexpected refresh response: {e}"
                ))));
            }
        };

        match (message.access_token, message.refresh_token) {
            (Some(access), Some(refresh)) => {
                self.state = SessionState::LoggedIn(Credentials::Jwt { access, refresh });
                info!("Access token refreshed");
                Ok(())
            }
            _ => Err(self.fail(HtbError::Authentication(
                "refresh response carried no tokens".to_string(),
            ))),
        }
    }

    /// Authorization header for the active credential
    pub fn headers(&self) -> Result<HeaderMap> {
        let credentials = self.credentials().ok_or_else(no_tokens)?;
        let value = HeaderValue::from_str(&format!("Bearer {}", credentials.bearer()))
            .map_err(|_| HtbError::InvalidToken("token is not a valid header value".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn logged_in(&self) -> Result<&Credentials> {
        self.credentials().ok_or_else(no_tokens)
    }

    /// Move to `Failed` and hand the error back
    fn fail(&mut self, error: HtbError) -> HtbError {
        self.state = SessionState::Failed(error.to_string());
        error
    }

    /// Authentication errors from the transport also fail the session
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| if e.is_authentication() { self.fail(e) } else { e })
    }
}

fn no_tokens() -> HtbError {
    HtbError::Authentication("No authentication tokens available".to_string())
}

fn parse_envelope<T: DeserializeOwned>(payload: htb_core::Payload) -> Result<Message<T>> {
    let envelope: Envelope<T> = serde_json::from_value(payload.into_json()?)?;
    Ok(envelope.message)
}

/// Purely numeric codes shorter than six digits are zero-padded
pub fn normalize_otp(otp: &str) -> String {
    let otp = otp.trim();
    if !otp.is_empty() && otp.len() < 6 && otp.chars().all(|c| c.is_ascii_digit()) {
        format!("{otp:0>6}")
    } else {
        otp.to_string()
    }
}

fn otp_accepted(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("correct") && !message.contains("incorrect") && !message.contains("invalid")
}

/// Session shared between the client and the request executor
///
/// Access is serialized, so concurrent callers never refresh twice.
#[derive(Debug, Default)]
pub struct SessionHandle {
    inner: Mutex<AuthSession>,
}

impl SessionHandle {
    pub fn new(session: AuthSession) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, AuthSession> {
        self.inner.lock().await
    }

    /// Synchronous access through exclusive ownership (used from `Drop`)
    pub fn get_mut(&mut self) -> &mut AuthSession {
        self.inner.get_mut()
    }
}

#[async_trait::async_trait]
impl Authorizer for SessionHandle {
    async fn authorize(&self, executor: &RequestExecutor) -> Result<HeaderMap> {
        let mut session = self.inner.lock().await;
        session.ensure_fresh(executor).await?;
        session.headers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::tests::token_expiring_at;
    use crate::prompt::{NoPrompt, StaticPrompt};
    use chrono::Utc;
    use htb_core::ClientConfig;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor_for(server: &MockServer) -> RequestExecutor {
        let config = ClientConfig::with_api_base(&format!("{}/api/v4", server.uri())).unwrap();
        RequestExecutor::new(&config).unwrap()
    }

    fn fresh_token() -> String {
        token_expiring_at(Utc::now().timestamp() + 3600)
    }

    fn expired_token() -> String {
        token_expiring_at(Utc::now().timestamp() - 3600)
    }

    async fn mount_login(server: &MockServer, access: &str, two_factor: bool) {
        Mock::given(method("POST"))
            .and(path("/api/v4/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "access_token": access,
                    "refresh_token": "refresh-1",
                    "is2FAEnabled": two_factor,
                }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn app_token_login_makes_no_request() {
        let server = MockServer::start().await;
        let executor = executor_for(&server);
        let mut session = AuthSession::new();

        let creds = session
            .login(&executor, LoginParams::app_token("app-token"), &NoPrompt)
            .await
            .unwrap();

        assert_eq!(creds, &Credentials::App("app-token".into()));
        assert!(server.received_requests().await.unwrap().is_empty());

        session.ensure_fresh(&executor).await.unwrap();
        assert_eq!(
            session.headers().unwrap()[AUTHORIZATION],
            "Bearer app-token"
        );
    }

    #[tokio::test]
    async fn password_login_stores_token_pair() {
        let server = MockServer::start().await;
        let access = fresh_token();
        Mock::given(method("POST"))
            .and(path("/api/v4/login"))
            .and(body_json(json!({
                "email": "user@example.com",
                "password": "hunter2",
                "remember": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"access_token": access, "refresh_token": "refresh-1", "is2FAEnabled": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let mut session = AuthSession::new();
        session
            .login(
                &executor,
                LoginParams::password("user@example.com", "hunter2").remember(true),
                &NoPrompt,
            )
            .await
            .unwrap();

        assert_eq!(
            session.cached_record(),
            CachedTokenRecord {
                access_token: Some(access),
                refresh_token: Some("refresh-1".into()),
                app_token: None,
            }
        );
    }

    #[tokio::test]
    async fn missing_details_are_prompted() {
        let server = MockServer::start().await;
        mount_login(&server, &fresh_token(), false).await;

        let executor = executor_for(&server);
        let mut session = AuthSession::new();
        session
            .login(
                &executor,
                LoginParams::default(),
                &StaticPrompt::new("user@example.com", "hunter2"),
            )
            .await
            .unwrap();

        assert!(matches!(session.state(), SessionState::LoggedIn(_)));
    }

    #[tokio::test]
    async fn missing_email_without_prompt_fails() {
        let server = MockServer::start().await;
        let executor = executor_for(&server);
        let mut session = AuthSession::new();

        let err = session
            .login(&executor, LoginParams::default(), &NoPrompt)
            .await
            .unwrap_err();

        assert!(matches!(err, HtbError::MissingEmail));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_factor_code_is_padded() {
        let server = MockServer::start().await;
        let access = fresh_token();
        mount_login(&server, &access, true).await;
        Mock::given(method("POST"))
            .and(path("/api/v4/2fa/login"))
            .and(header("authorization", format!("Bearer {access}").as_str()))
            .and(body_json(json!({"one_time_password": "001234"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "correct"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let mut session = AuthSession::new();
        session
            .login(
                &executor,
                LoginParams::password("user@example.com", "hunter2").with_otp("1234"),
                &NoPrompt,
            )
            .await
            .unwrap();

        assert!(matches!(session.state(), SessionState::LoggedIn(_)));
    }

    #[tokio::test]
    async fn rejected_otp_fails_session() {
        let server = MockServer::start().await;
        mount_login(&server, &fresh_token(), true).await;
        Mock::given(method("POST"))
            .and(path("/api/v4/2fa/login"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"message": "Incorrect one time password."}),
            ))
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let mut session = AuthSession::new();
        let err = session
            .login(
                &executor,
                LoginParams::password("user@example.com", "hunter2").with_otp_code(42),
                &NoPrompt,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HtbError::IncorrectOtp));
        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert!(session.headers().is_err());
    }

    #[tokio::test]
    async fn two_factor_without_code_fails() {
        let server = MockServer::start().await;
        mount_login(&server, &fresh_token(), true).await;

        let executor = executor_for(&server);
        let mut session = AuthSession::new();
        let err = session
            .login(
                &executor,
                LoginParams::password("user@example.com", "hunter2"),
                &NoPrompt,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HtbError::MissingOtp));
    }

    #[tokio::test]
    async fn rejected_credentials_are_authentication_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"message": "These credentials do not match our records."}),
            ))
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let mut session = AuthSession::new();
        let err = session
            .login(
                &executor,
                LoginParams::password("user@example.com", "wrong"),
                &NoPrompt,
            )
            .await
            .unwrap_err();

        assert!(err.is_authentication());
        assert!(matches!(session.state(), SessionState::Failed(_)));
    }

    #[tokio::test]
    async fn login_without_refresh_token_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"message": {"access_token": "a", "is2FAEnabled": false}}),
            ))
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let mut session = AuthSession::new();
        let err = session
            .login(
                &executor,
                LoginParams::password("user@example.com", "hunter2"),
                &NoPrompt,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, HtbError::Api(_)));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let server = MockServer::start().await;
        let new_access = fresh_token();
        Mock::given(method("POST"))
            .and(path("/api/v4/login/refresh"))
            .and(body_json(json!({"refresh_token": "refresh-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"access_token": new_access, "refresh_token": "refresh-2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let handle = SessionHandle::new(AuthSession::from_record(&CachedTokenRecord {
            access_token: Some(expired_token()),
            refresh_token: Some("refresh-1".into()),
            app_token: None,
        }));

        let headers = handle.authorize(&executor).await.unwrap();
        assert_eq!(headers[AUTHORIZATION], format!("Bearer {new_access}").as_str());

        // Fresh now; a second authorization does not refresh again
        handle.authorize(&executor).await.unwrap();
        assert_eq!(
            handle.lock().await.cached_record().refresh_token.as_deref(),
            Some("refresh-2")
        );
    }

    #[tokio::test]
    async fn rejected_refresh_fails_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/login/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "Unauthenticated."})),
            )
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let mut session = AuthSession::from_record(&CachedTokenRecord {
            access_token: Some(expired_token()),
            refresh_token: Some("stale".into()),
            app_token: None,
        });

        let err = session.ensure_fresh(&executor).await.unwrap_err();
        assert!(err.is_authentication());
        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert_eq!(session.cached_record(), CachedTokenRecord::default());
    }

    #[tokio::test]
    async fn undecodable_token_is_an_error() {
        let server = MockServer::start().await;
        let executor = executor_for(&server);
        let mut session = AuthSession::from_record(&CachedTokenRecord {
            access_token: Some("garbage".into()),
            refresh_token: Some("r".into()),
            app_token: None,
        });

        let err = session.ensure_fresh(&executor).await.unwrap_err();
        assert!(matches!(err, HtbError::InvalidToken(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn uninitialized_session_has_no_headers() {
        assert!(AuthSession::new().headers().unwrap_err().is_authentication());
    }

    #[test]
    fn otp_normalization() {
        assert_eq!(normalize_otp("1234"), "001234");
        assert_eq!(normalize_otp(" 987654 "), "987654");
        assert_eq!(normalize_otp("abc12"), "abc12");
        assert_eq!(LoginParams::default().with_otp_code(7).otp.as_deref(), Some("000007"));
    }

    #[test]
    fn otp_acceptance() {
        assert!(otp_accepted("correct"));
        assert!(otp_accepted("OTP is correct"));
        assert!(!otp_accepted("Incorrect one time password."));
        assert!(!otp_accepted("Invalid code"));
        assert!(!otp_accepted("error"));
    }
}
