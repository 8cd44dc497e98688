mod common;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{app_client, machine_profile, mount_json, mount_not_found, user_profile};
use htb_api::{HtbError, Machine, SessionRef};

async fn mount_machine_list(server: &MockServer) {
    mount_json(
        server,
        "GET",
        "machine/list",
        json!({"info": [
            {"id": 1, "name": "Lame", "os": "Linux", "points": 20, "maker": {"id": 1}, "ip": null},
            {"id": 2, "name": "Legacy", "os": "Windows", "points": 20, "maker": {"id": 1}, "ip": null},
        ]}),
    )
    .await;
}

#[tokio::test]
async fn summary_hydrates_exactly_once() {
    let server = MockServer::start().await;
    mount_machine_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v4/machine/profile/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"info": machine_profile(1, "Lame")})))
        .expect(1)
        .mount(&server)
        .await;

    let client = app_client(&server).await;
    let machines = client.get_machines(None, false).await.unwrap();
    assert_eq!(machines.len(), 2);

    let lame = &machines[0];
    assert!(lame.is_summary());
    assert!(!lame.retired);
    // Common fields never hydrate
    assert_eq!(lame.get("name").await.unwrap(), json!("Lame"));
    assert!(lame.is_summary());

    assert_eq!(lame.get("active").await.unwrap(), json!(true));
    assert!(!lame.is_summary());
    assert_eq!(
        lame.get("difficulty_ratings").await.unwrap(),
        json!({"counterCake": 3})
    );

    let full = Machine::from_record(machine_profile(1, "Lame"), false, SessionRef::detached()).unwrap();
    assert_eq!(lame.detail().await.unwrap(), full.loaded_detail().unwrap());
    assert!(machines[1].is_summary());
}

#[tokio::test]
async fn unknown_field_on_summary_makes_no_request() {
    let server = MockServer::start().await;
    mount_machine_list(&server).await;
    let client = app_client(&server).await;

    let machines = client.get_machines(Some(1), true).await.unwrap();
    assert_eq!(machines.len(), 1);
    assert!(machines[0].retired);

    let err = machines[0].get("favourite_colour").await.unwrap_err();
    assert!(matches!(err, HtbError::UnknownField { kind: "Machine", .. }));
    assert!(machines[0].is_summary());

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/api/v4/machine/profile/1"));
}

#[tokio::test]
async fn failed_hydration_can_be_retried() {
    let server = MockServer::start().await;
    mount_machine_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v4/machine/profile/2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_json(&server, "GET", "machine/profile/2", json!({"info": machine_profile(2, "Legacy")})).await;

    let client = app_client(&server).await;
    let machines = client.get_machines(None, false).await.unwrap();
    let legacy = &machines[1];

    assert!(matches!(
        legacy.hydrate().await,
        Err(HtbError::Http { status, .. }) if status.as_u16() == 500
    ));
    assert!(legacy.is_summary());

    legacy.hydrate().await.unwrap();
    assert!(!legacy.is_summary());
}

#[tokio::test]
async fn summary_and_full_record_are_equal() {
    let server = MockServer::start().await;
    mount_machine_list(&server).await;
    mount_json(&server, "GET", "machine/profile/1", json!({"info": machine_profile(1, "Lame")})).await;
    mount_json(&server, "GET", "user/profile/basic/1", json!({"profile": user_profile(1, "ch4p")})).await;

    let client = app_client(&server).await;
    let summary = client.get_machines(Some(1), false).await.unwrap().remove(0);
    let full = client.get_machine(1).await.unwrap();
    assert_eq!(summary, full);
    assert!(summary.is_summary());

    // Same numeric id, different kind
    let user = client.get_user(1).await.unwrap();
    assert_eq!(user.id(), full.id());
    assert_ne!(user.key(), full.key());
}

#[tokio::test]
async fn hydration_after_client_drop_fails() {
    let server = MockServer::start().await;
    mount_machine_list(&server).await;

    let client = app_client(&server).await;
    let machines = client.get_machines(None, false).await.unwrap();
    drop(client);

    assert!(matches!(
        machines[0].detail().await,
        Err(HtbError::SessionClosed)
    ));
}

#[tokio::test]
async fn search_skips_deleted_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/search/fetch"))
        .and(query_param("query", "ch4p lame"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"id": 1, "value": "ch4p"}, {"id": 404, "value": "gone"}],
            "machines": [{"id": 1, "value": "Lame"}],
            "teams": [{"id": 7}, {"id": 8}],
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(&server, "GET", "user/profile/basic/1", json!({"profile": user_profile(1, "ch4p")})).await;
    mount_not_found(&server, "user/profile/basic/404").await;
    mount_json(&server, "GET", "machine/profile/1", json!({"info": machine_profile(1, "Lame")})).await;
    mount_not_found(&server, "team/info/7").await;
    mount_json(
        &server,
        "GET",
        "team/info/8",
        json!({"id": 8, "name": "WinBoxes", "captain": {"id": 1}}),
    )
    .await;

    let client = app_client(&server).await;
    let search = client.search("ch4p lame").await.unwrap();
    assert_eq!(search.len(), 5);

    let users = search.users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "ch4p");

    // A missing team does not hide the ones after it
    let teams = search.teams().await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].id(), 8);

    assert_eq!(search.machines().await.unwrap()[0].name, "Lame");
    assert!(search.challenges().await.unwrap().is_empty());
}

#[tokio::test]
async fn fortresses_are_sorted_by_id() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "fortresses",
        json!({"data": {
            "10": {"id": 10, "name": "Synacktiv", "image": "", "number_of_flags": 6},
            "2": {"id": 2, "name": "Akerva", "image": "", "number_of_flags": 8},
            "1": {"id": 1, "name": "Jet", "image": "", "number_of_flags": 11},
        }}),
    )
    .await;

    let client = app_client(&server).await;
    let names: Vec<String> = client
        .get_fortresses(None)
        .await
        .unwrap()
        .iter()
        .map(|f| f.name.clone())
        .collect();
    assert_eq!(names, ["Jet", "Akerva", "Synacktiv"]);

    let first_two = client.get_fortresses(Some(2)).await.unwrap();
    assert_eq!(first_two.len(), 2);
    assert!(first_two.iter().all(|f| f.is_summary()));
}

#[tokio::test]
async fn user_content_resolves_lazily() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "GET",
        "user/profile/content/1",
        json!({"profile": {"content": {"machines": [{"id": 1}, {"id": 99}], "challenges": []}}}),
    )
    .await;
    mount_json(&server, "GET", "user/profile/basic/1", json!({"profile": user_profile(1, "ch4p")})).await;
    mount_json(&server, "GET", "machine/profile/1", json!({"info": machine_profile(1, "Lame")})).await;
    mount_not_found(&server, "machine/profile/99").await;

    let client = app_client(&server).await;
    let content = client.get_user(1).await.unwrap().content().await.unwrap();
    assert_eq!(content.len(), 2);
    assert_eq!(content.machines().await.unwrap().len(), 1);
    assert!(content.challenges().await.unwrap().is_empty());
}
