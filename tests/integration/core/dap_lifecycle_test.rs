/// End-to-end exercise of `DapClient` against a real subprocess speaking
/// DAP over stdio (the fake adapter under `tests/bin`), instead of the
/// mock-transport unit tests in `src/dap/client.rs`. Covers the
/// lifecycle state machine of SPEC_FULL §4.B: spawn -> initialize ->
/// launch -> deferred configurationDone on first continue -> stopped ->
/// stack/evaluate -> disconnect.
use debug_mediator::dap::client::DapClient;
use debug_mediator::dap::types::{Source, SourceBreakpoint};
use tokio::time::{timeout, Duration};

fn fake_adapter_path() -> String {
    env!("CARGO_BIN_EXE_fake_dap_adapter").to_string()
}

#[tokio::test]
async fn full_lifecycle_against_fake_adapter() {
    let client = DapClient::spawn(&fake_adapter_path(), &[])
        .await
        .expect("spawn fake adapter");

    let caps = client.start("fake").await.expect("initialize");
    assert!(caps.supports_configuration_done_request.unwrap_or(false));

    client
        .launch(serde_json::json!({"program": "/tmp/app.py"}))
        .await
        .expect("launch");

    let source = Source {
        name: Some("app.py".to_string()),
        path: Some("/tmp/app.py".to_string()),
        source_reference: None,
    };
    let breakpoints = vec![SourceBreakpoint {
        line: 3,
        column: None,
        condition: None,
        hit_condition: None,
    }];
    let verified = client
        .set_breakpoints(source, breakpoints)
        .await
        .expect("setBreakpoints");
    assert_eq!(verified.len(), 1);
    assert!(verified[0].verified);
    assert_eq!(verified[0].line, Some(3));

    // First continue_execution drives configurationDone then the
    // deferred launch response before racing the stop signal.
    let stop_body = timeout(Duration::from_secs(5), client.continue_execution(1))
        .await
        .expect("did not time out")
        .expect("continue");
    assert_eq!(stop_body["reason"], "breakpoint");
    assert_eq!(stop_body["threadId"], 1);

    let frames = client.stack_trace(1, 20).await.expect("stackTrace");
    assert_eq!(frames[0].name, "main");
    assert_eq!(frames[0].line, 10);

    let (result, type_) = client.evaluate("x", Some(1)).await.expect("evaluate");
    assert_eq!(result, "42");
    assert_eq!(type_.as_deref(), Some("int"));

    client.disconnect().await.expect("disconnect");
}

#[tokio::test]
async fn second_continue_skips_configuration_done_and_still_races_stop() {
    let client = DapClient::spawn(&fake_adapter_path(), &[])
        .await
        .expect("spawn fake adapter");

    client.start("fake").await.expect("initialize");
    client
        .launch(serde_json::json!({"program": "/tmp/app.py"}))
        .await
        .expect("launch");

    let first = timeout(Duration::from_secs(5), client.continue_execution(1))
        .await
        .expect("no timeout")
        .expect("first continue");
    assert_eq!(first["reason"], "breakpoint");

    let second = timeout(Duration::from_secs(5), client.continue_execution(1))
        .await
        .expect("no timeout")
        .expect("second continue");
    assert_eq!(second["reason"], "breakpoint");

    client.disconnect().await.expect("disconnect");
}
