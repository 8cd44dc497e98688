use serde::{Deserialize, Serialize};

/// `login` request
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub remember: bool,
}

/// `login/refresh` request
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// `2fa/login` request
#[derive(Debug, Clone, Serialize)]
pub struct OtpRequest<'a> {
    pub one_time_password: &'a str,
}

/// Responses wrap their payload in `message`, which is a plain string on failure
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub message: Message<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Message<T> {
    Data(T),
    Text(String),
}

/// Token payload of `login` and `login/refresh`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenMessage {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(rename = "is2FAEnabled", default)]
    pub two_factor_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_message_parses() {
        let envelope: Envelope<TokenMessage> = serde_json::from_value(json!({
            "message": {"access_token": "a", "refresh_token": "r", "is2FAEnabled": true}
        }))
        .unwrap();
        match envelope.message {
            Message::Data(msg) => {
                assert_eq!(msg.access_token.as_deref(), Some("a"));
                assert!(msg.two_factor_enabled);
            }
            Message::Text(_) => panic!("expected token payload"),
        }
    }

    #[test]
    fn text_message_parses() {
        let envelope: Envelope<TokenMessage> =
            serde_json::from_value(json!({"message": "Unauthenticated."})).unwrap();
        assert!(matches!(envelope.message, Message::Text(t) if t == "Unauthenticated."));
    }
}
