//! Hack The Box authentication
//!
//! This crate owns the credentials used by the API client and the decisions
//! around them: logging in, two-factor confirmation, refreshing expired access
//! tokens and caching tokens between runs.
//!
//! # Authentication Flow
//!
//! 1. An app token, if given, is used directly and never refreshed
//! 2. Otherwise email and password are exchanged at `login` for a JWT pair
//! 3. If the account has two-factor enabled, the OTP is confirmed at `2fa/login`
//! 4. Before each authenticated request an expired access token is exchanged
//!    at `login/refresh`
//!
//! # Example
//!
//! ```no_run
//! use htb_auth::{AuthSession, LoginParams, NoPrompt};
//! use htb_core::{ClientConfig, RequestExecutor};
//!
//! # async fn example() -> htb_core::Result<()> {
//! let executor = RequestExecutor::new(&ClientConfig::default())?;
//! let mut session = AuthSession::new();
//! session
//!     .login(&executor, LoginParams::password("user@example.com", "hunter2"), &NoPrompt)
//!     .await?;
//!
//! // Later, before an authenticated call
//! session.ensure_fresh(&executor).await?;
//! let headers = session.headers()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Token Storage
//!
//! Tokens are kept through the [`TokenStore`] trait. [`FileTokenStore`] keeps
//! them as plain JSON with owner-only permissions; [`MemoryTokenStore`] is for
//! tests.

pub mod credentials;
pub mod file_store;
pub mod jwt;
pub mod models;
pub mod prompt;
pub mod session;
pub mod store;

// Re-export main types
pub use credentials::{CachedTokenRecord, Credentials};
pub use file_store::FileTokenStore;
pub use prompt::{CredentialPrompt, NoPrompt, StaticPrompt, TerminalPrompt};
pub use session::{AuthSession, LoginParams, SessionHandle, SessionState, normalize_otp};
pub use store::{MemoryTokenStore, TokenStore};
