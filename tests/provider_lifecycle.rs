//! End-to-end lifecycle tests against a mocked WAPI endpoint.

use std::time::Duration;

use nios_provider::testing::ProviderTester;
use nios_provider::{NiosProvider, ProviderError, INTERNAL_ID_EA};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn configured_tester(server: &MockServer) -> ProviderTester<NiosProvider> {
    let tester = ProviderTester::new(NiosProvider::new());
    tester
        .configure(json!({
            "server": server.uri(),
            "username": "admin",
            "password": "infoblox",
            "wapi_version": "2.13",
            "delete_conflict_timeout_secs": 1,
        }))
        .await
        .expect("configure against mock grid");
    tester
}

#[tokio::test]
async fn create_splits_owned_and_inherited_extattrs() {
    let server = MockServer::start().await;

    // The grid echoes the submitted attributes, normalizes the internal ID,
    // and reports one attribute inherited from a parent scope.
    Mock::given(method("POST"))
        .and(path("/wapi/v2.13/rangetemplate"))
        .and(body_partial_json(json!({"name": "tmpl-1"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": {
                "_ref": "rangetemplate/a:tmpl-1",
                "name": "tmpl-1",
                "number_of_addresses": 100,
                "offset": 10,
                "extattrs": {
                    "Site": {"value": "NYC"},
                    INTERNAL_ID_EA: {"value": "fixed-id"},
                    "Region": {"value": "US-East"},
                },
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tester = configured_tester(&server).await;
    let state = tester
        .create(
            "nios_range_template",
            json!({
                "name": "tmpl-1",
                "number_of_addresses": 100,
                "offset": 10,
                "extattrs": {"Site": "NYC"},
            }),
        )
        .await
        .unwrap();

    assert_eq!(state["ref"], "rangetemplate/a:tmpl-1");
    // Owned: the declared key plus the internal ID, nothing else.
    assert_eq!(
        state["extattrs"],
        json!({"Site": "NYC", INTERNAL_ID_EA: "fixed-id"})
    );
    // The full snapshot keeps the inherited attribute.
    assert_eq!(state["extattrs_all"]["Region"], "US-East");
}

#[tokio::test]
async fn read_rediscovers_through_extattr_search() {
    let server = MockServer::start().await;

    // The stored ref answers 404; the object has moved.
    Mock::given(method("GET"))
        .and(path("/wapi/v2.13/rangetemplate/a:tmpl-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "Error": "AdmConDataNotFoundError", "text": "not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The EA-filtered search relocates it under its new ref.
    Mock::given(method("GET"))
        .and(path("/wapi/v2.13/rangetemplate"))
        .and(query_param(format!("*{}", INTERNAL_ID_EA), "fixed-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{
                "_ref": "rangetemplate/b:tmpl-1-renamed",
                "name": "tmpl-1-renamed",
                "number_of_addresses": 100,
                "offset": 10,
                "extattrs": {
                    "Site": {"value": "NYC"},
                    INTERNAL_ID_EA: {"value": "fixed-id"},
                },
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tester = configured_tester(&server).await;
    let refreshed = tester
        .read(
            "nios_range_template",
            json!({
                "ref": "rangetemplate/a:tmpl-1",
                "name": "tmpl-1",
                "number_of_addresses": 100,
                "offset": 10,
                "extattrs": {"Site": "NYC", INTERNAL_ID_EA: "fixed-id"},
                "extattrs_all": {"Site": "NYC", INTERNAL_ID_EA: "fixed-id"},
            }),
        )
        .await
        .unwrap();

    assert_eq!(refreshed["ref"], "rangetemplate/b:tmpl-1-renamed");
    assert_eq!(refreshed["name"], "tmpl-1-renamed");
    assert_eq!(refreshed["extattrs"][INTERNAL_ID_EA], "fixed-id");
}

#[tokio::test]
async fn read_removes_state_when_nothing_matches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wapi/v2.13/rangetemplate/a:tmpl-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"text": "not found"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/wapi/v2.13/rangetemplate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
        .mount(&server)
        .await;

    let tester = configured_tester(&server).await;
    let refreshed = tester
        .read(
            "nios_range_template",
            json!({
                "ref": "rangetemplate/a:tmpl-1",
                "extattrs": {INTERNAL_ID_EA: "fixed-id"},
                "extattrs_all": {INTERNAL_ID_EA: "fixed-id"},
            }),
        )
        .await
        .unwrap();

    assert!(refreshed.is_null());
}

#[tokio::test]
async fn update_sends_inherited_attributes_back() {
    let server = MockServer::start().await;

    // The PUT body must carry the inherited Region key the user never
    // declared, with the stored value.
    Mock::given(method("PUT"))
        .and(path("/wapi/v2.13/rangetemplate/a:tmpl-1"))
        .and(body_partial_json(json!({
            "comment": "updated",
            "extattrs": {
                "Site": {"value": "BOS"},
                "Region": {"value": "US-East"},
                INTERNAL_ID_EA: {"value": "fixed-id"},
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "_ref": "rangetemplate/a:tmpl-1",
                "name": "tmpl-1",
                "number_of_addresses": 100,
                "offset": 10,
                "comment": "updated",
                "extattrs": {
                    "Site": {"value": "BOS"},
                    "Region": {"value": "US-East"},
                    INTERNAL_ID_EA: {"value": "fixed-id"},
                },
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tester = configured_tester(&server).await;
    let updated = tester
        .update(
            "nios_range_template",
            json!({
                "ref": "rangetemplate/a:tmpl-1",
                "name": "tmpl-1",
                "number_of_addresses": 100,
                "offset": 10,
                "extattrs": {"Site": "NYC", INTERNAL_ID_EA: "fixed-id"},
                "extattrs_all": {
                    "Site": "NYC",
                    "Region": "US-East",
                    INTERNAL_ID_EA: "fixed-id",
                },
            }),
            json!({
                "name": "tmpl-1",
                "number_of_addresses": 100,
                "offset": 10,
                "comment": "updated",
                "extattrs": {"Site": "BOS"},
            }),
        )
        .await
        .unwrap();

    // Region stays out of the user-facing map but in the snapshot.
    assert_eq!(updated["extattrs"], json!({"Site": "BOS", INTERNAL_ID_EA: "fixed-id"}));
    assert_eq!(updated["extattrs_all"]["Region"], "US-East");
    assert_eq!(updated["comment"], "updated");
}

#[tokio::test]
async fn delete_conflict_surfaces_after_window() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/wapi/v2.13/dhcpoptionspace/x:cisco-ap"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "Error": "Client.Ibap.Data",
            "text": "Cannot delete option space: referenced by an option definition",
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Window of one second and a two-second retry interval: exactly one
    // attempt, then the conflict surfaces.
    let tester = configured_tester(&server).await;
    let err = tester
        .delete(
            "nios_option_space",
            json!({"ref": "dhcpoptionspace/x:cisco-ap", "name": "cisco-ap"}),
        )
        .await
        .unwrap_err();

    assert!(err.is_conflict());
}

#[tokio::test]
async fn delete_tolerates_already_deleted() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/wapi/v2.13/roaminghost/y:laptop-7"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"text": "not found"})))
        .mount(&server)
        .await;

    let tester = configured_tester(&server).await;
    tester
        .delete(
            "nios_roaming_host",
            json!({"ref": "roaminghost/y:laptop-7", "name": "laptop-7"}),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn import_then_read_establishes_internal_id() {
    let server = MockServer::start().await;

    // The adopted object carries no internal ID.
    Mock::given(method("GET"))
        .and(path("/wapi/v2.13/roaminghost/y:laptop-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "_ref": "roaminghost/y:laptop-7",
                "name": "laptop-7",
                "mac": "aa:bb:cc:dd:ee:ff",
                "extattrs": {"Owner": {"value": "net-team"}},
            }
        })))
        .mount(&server)
        .await;

    // Read writes one back; the grid echoes whatever it was given.
    Mock::given(method("PUT"))
        .and(path("/wapi/v2.13/roaminghost/y:laptop-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "_ref": "roaminghost/y:laptop-7",
                "name": "laptop-7",
                "mac": "aa:bb:cc:dd:ee:ff",
                "extattrs": {
                    "Owner": {"value": "net-team"},
                    INTERNAL_ID_EA: {"value": "established-id"},
                },
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tester = configured_tester(&server).await;
    let imported = tester
        .import_resource("nios_roaming_host", "roaminghost/y:laptop-7")
        .await
        .unwrap();
    assert_eq!(imported.len(), 1);
    let state = &imported[0].state;
    assert_eq!(state["imported"], true);
    assert_eq!(state["extattrs_all"]["Owner"], "net-team");

    let refreshed = tester
        .read("nios_roaming_host", state.clone())
        .await
        .unwrap();
    assert_eq!(refreshed["imported"], false);
    assert_eq!(refreshed["extattrs_all"][INTERNAL_ID_EA], "established-id");
}

#[tokio::test]
async fn server_error_during_read_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wapi/v2.13/rangetemplate/a:tmpl-1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let tester = configured_tester(&server).await;
    let err = tester
        .read(
            "nios_range_template",
            json!({
                "ref": "rangetemplate/a:tmpl-1",
                "extattrs_all": {INTERNAL_ID_EA: "fixed-id"},
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Api { status: 503, .. }));
}

#[tokio::test]
async fn delete_conflict_clears_within_window() {
    let server = MockServer::start().await;

    // First attempt conflicts, second succeeds.
    Mock::given(method("DELETE"))
        .and(path("/wapi/v2.13/dhcpoptionspace/x:cisco-ap"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "text": "Cannot delete option space: referenced by an option definition",
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/wapi/v2.13/dhcpoptionspace/x:cisco-ap"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!("dhcpoptionspace/x:cisco-ap")),
        )
        .mount(&server)
        .await;

    let tester = ProviderTester::new(NiosProvider::new());
    tester
        .configure(json!({
            "server": server.uri(),
            "username": "admin",
            "password": "infoblox",
            "delete_conflict_timeout_secs": 10,
        }))
        .await
        .unwrap();

    tokio::time::timeout(
        Duration::from_secs(8),
        tester.delete(
            "nios_option_space",
            json!({"ref": "dhcpoptionspace/x:cisco-ap", "name": "cisco-ap"}),
        ),
    )
    .await
    .expect("delete finished within the window")
    .unwrap();
}
