//! End-to-end tests: a real server on an ephemeral port, driven through
//! the console client exactly the way an operator console would use it.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use labstream_api::config::ServerConfig;
use labstream_api::orchestrator::RunOrchestrator;
use labstream_api::state::AppState;
use labstream_api::{routes, ws};
use labstream_client::api::ConsoleApi;
use labstream_client::{ConsoleClient, RunSession, StartOutcome};
use labstream_core::history::RunHistory;
use labstream_core::job::{JobCatalog, JobSpec, StaticCatalog};

/// Write an executable temp script with the given body.
fn write_script(body: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::Builder::new()
        .suffix(".sh")
        .tempfile()
        .expect("create temp file");
    writeln!(f, "#!/bin/sh").expect("write shebang");
    write!(f, "{body}").expect("write body");
    let mut perms = f.as_file().metadata().expect("metadata").permissions();
    perms.set_mode(0o755);
    f.as_file().set_permissions(perms).expect("chmod");
    f
}

/// Boot the full application on an ephemeral port.
async fn spawn_server(jobs: Vec<JobSpec>) -> SocketAddr {
    let registry = Arc::new(ws::ConnectionRegistry::new());
    let history = Arc::new(RunHistory::new(50));
    let catalog: Arc<dyn JobCatalog> = Arc::new(StaticCatalog::new(jobs));
    let orchestrator = Arc::new(RunOrchestrator::new(
        Arc::clone(&registry),
        catalog,
        Arc::clone(&history),
    ));

    let state = AppState {
        config: Arc::new(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: 30,
            history_capacity: 50,
            jobs_file: None,
        }),
        registry,
        orchestrator,
        history,
    };

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });

    addr
}

/// Poll the session until its view turns terminal.
async fn wait_for_terminal(session: &RunSession) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if session.snapshot().await.is_terminal() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run did not reach a terminal state in time");
}

// ---------------------------------------------------------------------------
// Test: welcome handshake yields an addressable identity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn welcome_handshake_yields_addressable_identity() {
    let addr = spawn_server(vec![]).await;

    let client = ConsoleClient::new(format!("ws://{addr}"));
    let conn = client.connect().await.expect("connect");

    // The identity is a server-generated UUID.
    uuid::Uuid::parse_str(&conn.connection_id).expect("identity should be a UUID");

    // The history endpoint answers over plain HTTP.
    let api = ConsoleApi::new(format!("http://{addr}"));
    let entries = api.history().await.expect("history");
    assert!(entries.is_empty());
}

// ---------------------------------------------------------------------------
// Test: full flow — trigger, stream, reduce, list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn console_runs_a_job_and_reconstructs_its_state() {
    let script = write_script(
        "echo calibrating\necho '{\"step\": 1, \"total_steps\": 2}'\necho '{\"step\": 2, \"total_steps\": 2, \"verdict\": \"pass\"}'\n",
    );
    let addr = spawn_server(vec![JobSpec {
        id: "calibration".to_string(),
        program: script.path().to_str().expect("path").to_string(),
        args: vec![],
        working_directory: None,
        total_steps: Some(2),
    }])
    .await;

    let client = ConsoleClient::new(format!("ws://{addr}"));
    let conn = client.connect().await.expect("connect");
    let connection_id = conn.connection_id.clone();
    let mut ws_stream = conn.ws_stream;

    let session = Arc::new(RunSession::new());

    // Event pump, reading the WebSocket into the reducer.
    let pump_session = Arc::clone(&session);
    let pump = tokio::spawn(async move {
        pump_session.process_events(&mut ws_stream).await;
    });

    let api = ConsoleApi::new(format!("http://{addr}"));
    let outcome = session
        .start(|| async {
            api.start_run(&connection_id, "calibration", &serde_json::Map::new())
                .await
        })
        .await
        .expect("start_run");
    assert!(matches!(outcome, StartOutcome::Started(_)));

    wait_for_terminal(&session).await;

    let view = session.snapshot().await;
    assert!(view.is_complete);
    assert!(!view.has_error);
    assert!(!view.is_running);
    assert_eq!(view.total_steps, 2);
    assert_eq!(view.completed_steps, 2);
    assert_eq!(view.progress_percentage(), 100.0);
    assert_eq!(view.result.as_ref().expect("result")["verdict"], "pass");
    assert!(view
        .progress
        .iter()
        .any(|e| e.message.as_deref() == Some("calibrating")));

    // The terminal run is listed by the history endpoint, newest first.
    let entries = api.history().await.expect("history");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);
    assert_eq!(entries[0].job_id, "calibration");

    session.dispose();
    let _ = pump.await;
}

// ---------------------------------------------------------------------------
// Test: a failed job surfaces hasError through the same pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_surfaces_error_in_the_view() {
    let script = write_script("echo 'cannot reach instrument' 1>&2\nexit 7\n");
    let addr = spawn_server(vec![JobSpec {
        id: "probe".to_string(),
        program: script.path().to_str().expect("path").to_string(),
        args: vec![],
        working_directory: None,
        total_steps: None,
    }])
    .await;

    let client = ConsoleClient::new(format!("ws://{addr}"));
    let conn = client.connect().await.expect("connect");
    let connection_id = conn.connection_id.clone();
    let mut ws_stream = conn.ws_stream;

    let session = Arc::new(RunSession::new());
    let pump_session = Arc::clone(&session);
    let pump = tokio::spawn(async move {
        pump_session.process_events(&mut ws_stream).await;
    });

    let api = ConsoleApi::new(format!("http://{addr}"));
    session
        .start(|| async {
            api.start_run(&connection_id, "probe", &serde_json::Map::new())
                .await
        })
        .await
        .expect("start_run");

    wait_for_terminal(&session).await;

    let view = session.snapshot().await;
    assert!(view.has_error);
    assert!(!view.is_complete);
    assert!(view.error.as_deref().expect("error").contains("7"));

    let entries = api.history().await.expect("history");
    assert!(!entries[0].success);
    assert_eq!(entries[0].stderr, "cannot reach instrument");

    session.dispose();
    let _ = pump.await;
}

// ---------------------------------------------------------------------------
// Test: starting against an unknown job is a clean API error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_a_clean_api_error() {
    let addr = spawn_server(vec![]).await;

    let client = ConsoleClient::new(format!("ws://{addr}"));
    let conn = client.connect().await.expect("connect");

    let api = ConsoleApi::new(format!("http://{addr}"));
    let err = api
        .start_run(&conn.connection_id, "mystery", &serde_json::Map::new())
        .await
        .expect_err("unknown job must fail");

    match err {
        labstream_client::api::ConsoleApiError::Api { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("JOB_NOT_FOUND"));
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
}
