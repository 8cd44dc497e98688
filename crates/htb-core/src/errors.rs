use thiserror::Error;

/// Hack The Box client error types
#[derive(Error, Debug)]
pub enum HtbError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("An email address is required to log in")]
    MissingEmail,

    #[error("A password is required to log in")]
    MissingPassword,

    #[error("Two-factor authentication is enabled but no OTP was given")]
    MissingOtp,

    #[error("The one-time password was not accepted")]
    IncorrectOtp,

    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("Resource not found: {endpoint}")]
    NotFound { endpoint: String },

    #[error("Still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Unexpected API response: {0}")]
    Api(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Incorrect flag")]
    IncorrectFlag,

    #[error("User flag has already been submitted")]
    UserAlreadySubmitted,

    #[error("Root flag has already been submitted")]
    RootAlreadySubmitted,

    #[error("Flag submission failed: {0}")]
    Solve(String),

    #[error("Incorrect argument: {0}")]
    IncorrectArgument(String),

    #[error("Challenge has no Docker instance available")]
    NoDocker,

    #[error("Challenge has no download available")]
    NoDownload,

    #[error("Client rate limit: {0}")]
    ClientRateLimit(String),

    #[error("VPN error: {0}")]
    Vpn(String),

    #[error("Cannot switch VPN server while a machine is active")]
    CannotSwitchWithActive,

    #[error("Too many reset attempts")]
    TooManyResetAttempts,

    #[error("Machine error: {0}")]
    Machine(String),

    #[error("{kind} has no field named '{field}'")]
    UnknownField { kind: &'static str, field: String },

    #[error("The owning client session has been dropped")]
    SessionClosed,

    #[error("Token cache error: {0}")]
    Cache(String),

    #[error("Timed out acquiring the token cache lock")]
    LockTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HtbError {
    /// Whether this error belongs to the authentication family
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::MissingEmail
                | Self::MissingPassword
                | Self::MissingOtp
                | Self::IncorrectOtp
                | Self::InvalidToken(_)
        )
    }

    /// Whether the API answered 404 for this request
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, HtbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_family() {
        assert!(HtbError::IncorrectOtp.is_authentication());
        assert!(HtbError::MissingPassword.is_authentication());
        assert!(HtbError::Authentication("rejected".into()).is_authentication());
        assert!(!HtbError::IncorrectFlag.is_authentication());
        assert!(
            !HtbError::NotFound {
                endpoint: "user/profile/basic/1".into()
            }
            .is_authentication()
        );
    }

    #[test]
    fn unknown_field_message_names_kind() {
        let err = HtbError::UnknownField {
            kind: "Machine",
            field: "colour".into(),
        };
        assert_eq!(err.to_string(), "Machine has no field named 'colour'");
    }
}
