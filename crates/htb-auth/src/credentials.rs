use serde::{Deserialize, Serialize};

/// The credential currently used to authorize requests
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Long-lived app token; never refreshed
    App(String),
    /// JWT access token with the refresh token used to renew it
    Jwt { access: String, refresh: String },
}

impl Credentials {
    /// Token sent in the `Authorization` header
    pub fn bearer(&self) -> &str {
        match self {
            Self::App(token) => token,
            Self::Jwt { access, .. } => access,
        }
    }

    pub fn is_app_token(&self) -> bool {
        matches!(self, Self::App(_))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::App(_) => f.write_str("Credentials::App([REDACTED])"),
            Self::Jwt { .. } => f.write_str("Credentials::Jwt([REDACTED])"),
        }
    }
}

/// On-disk representation of the token cache
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTokenRecord {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub app_token: Option<String>,
}

impl CachedTokenRecord {
    /// Usable credentials, if the record holds any
    ///
    /// An app token wins over a JWT pair; a JWT pair needs both halves.
    pub fn credentials(&self) -> Option<Credentials> {
        if let Some(app) = &self.app_token {
            return Some(Credentials::App(app.clone()));
        }
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) => Some(Credentials::Jwt {
                access: access.clone(),
                refresh: refresh.clone(),
            }),
            _ => None,
        }
    }
}

impl From<&Credentials> for CachedTokenRecord {
    fn from(credentials: &Credentials) -> Self {
        match credentials {
            Credentials::App(token) => Self {
                app_token: Some(token.clone()),
                ..Self::default()
            },
            Credentials::Jwt { access, refresh } => Self {
                access_token: Some(access.clone()),
                refresh_token: Some(refresh.clone()),
                app_token: None,
            },
        }
    }
}

impl std::fmt::Debug for CachedTokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTokenRecord")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("app_token", &self.app_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
