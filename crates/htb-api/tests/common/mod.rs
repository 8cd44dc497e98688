#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use htb_api::HtbClient;

pub fn api_base(server: &MockServer) -> String {
    format!("{}/api/v4", server.uri())
}

/// Unsigned JWT whose `exp` claim is `exp`
pub fn token_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"aud":"5","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}

pub fn fresh_token() -> String {
    token_expiring_at(Utc::now().timestamp() + 3600)
}

pub fn expired_token() -> String {
    token_expiring_at(Utc::now().timestamp() - 3600)
}

/// Client authenticated with an app token against the mock server
pub async fn app_client(server: &MockServer) -> HtbClient {
    HtbClient::builder()
        .api_base(&api_base(server))
        .unwrap()
        .app_token("app-token")
        .connect()
        .await
        .unwrap()
}

pub async fn mount_json(server: &MockServer, verb: &str, route: &str, body: Value) {
    Mock::given(method(verb))
        .and(path(format!("/api/v4/{route}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_not_found(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v4/{route}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(server)
        .await;
}

pub fn machine_profile(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "os": "Linux",
        "points": 20,
        "release": "2017-03-14T19:00:00.000000Z",
        "user_owns_count": 100,
        "root_owns_count": 90,
        "authUserInUserOwns": false,
        "authUserInRootOwns": false,
        "authUserHasReviewed": false,
        "stars": 4.5,
        "avatar": "/storage/avatars/machine.png",
        "difficultyText": "Easy",
        "free": false,
        "retired": true,
        "ip": "10.10.10.3",
        "maker": {"id": 1},
        "maker2": null,
        "active": 1,
        "authUserFirstUserTime": null,
        "authUserFirstRootTime": null,
        "userBlood": null,
        "rootBlood": null,
        "feedbackForChart": {"counterCake": 3},
    })
}

pub fn user_profile(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "ranking": 10,
        "points": 100,
        "user_owns": 20,
        "system_owns": 18,
        "user_bloods": 0,
        "system_bloods": 0,
        "rank": "Hacker",
        "respects": 4,
        "team": null,
        "public": true,
    })
}
