use std::io::{self, BufRead, Write};

use zeroize::Zeroizing;

/// Trait for asking the user for login details that were not supplied
///
/// Returning `None` means the value is unavailable; login then fails instead
/// of proceeding without it.
#[async_trait::async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn email(&self) -> Option<String>;

    /// The returned string will be automatically zeroized when dropped.
    async fn password(&self) -> Option<Zeroizing<String>>;

    async fn otp(&self) -> Option<String>;
}

/// No-op prompt that never yields a value
///
/// Use this for non-interactive callers: missing details become errors.
#[derive(Debug, Clone, Default)]
pub struct NoPrompt;

#[async_trait::async_trait]
impl CredentialPrompt for NoPrompt {
    async fn email(&self) -> Option<String> {
        None
    }

    async fn password(&self) -> Option<Zeroizing<String>> {
        None
    }

    async fn otp(&self) -> Option<String> {
        None
    }
}

/// Static prompt for testing
#[derive(Debug, Clone, Default)]
pub struct StaticPrompt {
    email: Option<String>,
    password: Option<String>,
    otp: Option<String>,
}

impl StaticPrompt {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
            otp: None,
        }
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }
}

#[async_trait::async_trait]
impl CredentialPrompt for StaticPrompt {
    async fn email(&self) -> Option<String> {
        self.email.clone()
    }

    async fn password(&self) -> Option<Zeroizing<String>> {
        self.password.clone().map(Zeroizing::new)
    }

    async fn otp(&self) -> Option<String> {
        self.otp.clone()
    }
}

/// Reads missing details from the controlling terminal
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    async fn ask(label: &'static str) -> Option<Zeroizing<String>> {
        tokio::task::spawn_blocking(move || read_line(label).ok().flatten())
            .await
            .ok()
            .flatten()
    }
}

#[async_trait::async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn email(&self) -> Option<String> {
        Self::ask("Email: ").await.map(|s| s.as_str().to_owned())
    }

    async fn password(&self) -> Option<Zeroizing<String>> {
        Self::ask("Password: ").await
    }

    async fn otp(&self) -> Option<String> {
        Self::ask("OTP: ").await.map(|s| s.as_str().to_owned())
    }
}

fn read_line(label: &str) -> io::Result<Option<Zeroizing<String>>> {
    let mut stderr = io::stderr();
    stderr.write_all(label.as_bytes())?;
    stderr.flush()?;

    let mut line = Zeroizing::new(String::new());
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(Zeroizing::new(trimmed.to_string())))
}
