use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use login_target::{UserStore, build_app};
use rampr_core::{
    LoginScenario, RunConfig, STATUS_WAS_200, STATUS_WAS_401, Stage, StatsSnapshot, Threshold,
    run_iterations, run_load_test,
};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/login", addr)
}

fn fixed_status(status: StatusCode) -> Router {
    Router::new().route("/login", post(move || async move { status }))
}

fn passes(snapshot: &StatsSnapshot, name: &str) -> (u64, u64) {
    let check = snapshot.check(name).expect("check recorded");
    (check.passes, check.fails)
}

#[tokio::test]
async fn always_ok_endpoint_passes_only_the_200_check() {
    let url = serve(fixed_status(StatusCode::OK)).await;
    let scenario = LoginScenario::new(url).with_pause(Duration::ZERO);

    let snapshot = run_iterations(&scenario, 50).await.unwrap();

    assert_eq!(snapshot.iterations, 50);
    assert_eq!(snapshot.total_requests, 50);
    assert_eq!(passes(&snapshot, STATUS_WAS_200), (50, 0));
    assert_eq!(passes(&snapshot, STATUS_WAS_401), (0, 50));
    assert_eq!(snapshot.failed_requests, 0);
}

#[tokio::test]
async fn password_draw_splits_200_and_401_roughly_evenly() {
    let url = serve(build_app(UserStore::default())).await;
    let scenario = LoginScenario::new(url).with_pause(Duration::ZERO);

    let n = 400;
    let snapshot = run_iterations(&scenario, n).await.unwrap();

    let (ok, ok_fails) = passes(&snapshot, STATUS_WAS_200);
    let (unauthorized, unauthorized_fails) = passes(&snapshot, STATUS_WAS_401);
    assert_eq!(ok + ok_fails, n);
    assert_eq!(unauthorized + unauthorized_fails, n);
    assert_eq!(ok + unauthorized, n);

    let share = ok as f64 / n as f64;
    assert!((0.35..=0.65).contains(&share), "status 200 share was {share}");
    assert_eq!(snapshot.status_counts.get(&200).copied().unwrap_or(0), ok);
    assert_eq!(snapshot.status_counts.get(&401).copied().unwrap_or(0), unauthorized);
}

#[tokio::test]
async fn server_errors_fail_both_checks() {
    let url = serve(fixed_status(StatusCode::SERVICE_UNAVAILABLE)).await;
    let scenario = LoginScenario::new(url).with_pause(Duration::ZERO);

    let snapshot = run_iterations(&scenario, 10).await.unwrap();

    assert_eq!(passes(&snapshot, STATUS_WAS_200), (0, 10));
    assert_eq!(passes(&snapshot, STATUS_WAS_401), (0, 10));
    assert_eq!(snapshot.failed_requests, 10);
}

#[tokio::test]
async fn unreachable_endpoint_fails_both_checks_without_aborting() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let scenario =
        LoginScenario::new(format!("http://{}/login", addr)).with_pause(Duration::ZERO);

    let snapshot = run_iterations(&scenario, 4).await.unwrap();

    assert_eq!(snapshot.iterations, 4);
    assert_eq!(passes(&snapshot, STATUS_WAS_200), (0, 4));
    assert_eq!(passes(&snapshot, STATUS_WAS_401), (0, 4));
    assert_eq!(snapshot.failed_requests, 4);
    assert_eq!(snapshot.errors.values().sum::<u64>(), 4);
    assert!(snapshot.latency_histogram.is_empty());
}

#[tokio::test]
async fn request_is_json_post_with_exactly_two_credentials() {
    let app = Router::new().route(
        "/login",
        post(|headers: HeaderMap, body: String| async move {
            let json_header = headers
                .get(header::CONTENT_TYPE)
                .is_some_and(|v| v == "application/json");
            let value: serde_json::Value = match serde_json::from_str(&body) {
                Ok(v) => v,
                Err(_) => return StatusCode::BAD_REQUEST,
            };
            let well_formed = value.as_object().is_some_and(|obj| {
                obj.len() == 2
                    && obj.get("username").and_then(|v| v.as_str()) == Some("user1")
                    && matches!(
                        obj.get("password").and_then(|v| v.as_str()),
                        Some("password1") | Some("password2")
                    )
            });
            if json_header && well_formed {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            }
        }),
    );
    let url = serve(app).await;
    let scenario = LoginScenario::new(url).with_pause(Duration::ZERO);

    let snapshot = run_iterations(&scenario, 20).await.unwrap();

    assert_eq!(passes(&snapshot, STATUS_WAS_200), (20, 0));
}

#[tokio::test]
async fn each_iteration_pauses_one_second() {
    let url = serve(fixed_status(StatusCode::OK)).await;
    let scenario = LoginScenario::new(url);

    let start = Instant::now();
    let snapshot = run_iterations(&scenario, 3).await.unwrap();

    assert_eq!(snapshot.iterations, 3);
    assert!(start.elapsed() >= Duration::from_secs(3), "took {:?}", start.elapsed());
}

#[tokio::test]
async fn ramped_run_against_login_target_meets_latency_threshold() {
    let url = serve(build_app(UserStore::default())).await;
    let scenario = Arc::new(LoginScenario::new(url).with_pause(Duration::from_millis(100)));
    let config = RunConfig {
        stages: vec![
            Stage::new(Duration::from_millis(500), 4),
            Stage::new(Duration::from_millis(500), 0),
        ],
        start_vus: 1,
        thresholds: vec![
            Threshold::parse("http_req_duration", "p(99) < 3000").unwrap(),
            Threshold::parse("iterations", "count > 0").unwrap(),
        ],
        graceful_stop: Duration::from_secs(10),
    };

    let progress_calls = Arc::new(AtomicU32::new(0));
    let calls = progress_calls.clone();
    let report = run_load_test(
        config,
        scenario,
        Some(move |_: StatsSnapshot| {
            calls.fetch_add(1, Ordering::Relaxed);
        }),
    )
    .await
    .unwrap();

    assert!(progress_calls.load(Ordering::Relaxed) >= 1);

    let snapshot = &report.snapshot;
    assert!(snapshot.iterations > 0);
    assert_eq!(snapshot.active_vus, 0);
    assert!(report.thresholds_passed(), "{:?}", report.thresholds);

    let (ok, ok_fails) = passes(snapshot, STATUS_WAS_200);
    let (unauthorized, _) = passes(snapshot, STATUS_WAS_401);
    assert_eq!(ok + ok_fails, snapshot.iterations);
    assert_eq!(ok + unauthorized, snapshot.iterations);
}
