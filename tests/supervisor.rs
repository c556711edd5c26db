//! End-to-end runs against a recording transport and echo.

mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{RecordingEcho, RecordingTransport, log_files, test_config};
use jobvisor::{
    Event, EventKind, FinalStatus, Level, Payload, RunError, RunState, RunSupervisor, SendOutcome,
    Subscribe, ValidationError,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn last_status(transport: &RecordingTransport) -> Option<FinalStatus> {
    match transport.sent().last()?.payload() {
        Payload::RunEnded { final_status } => Some(*final_status),
        _ => None,
    }
}

fn assert_framed(kinds: &[&str]) {
    assert_eq!(kinds.first(), Some(&"run_started"));
    assert_eq!(kinds.last(), Some(&"run_ended"));
    assert_eq!(kinds.iter().filter(|k| **k == "run_started").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "run_ended").count(), 1);
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.kinds.lock().unwrap().push(event.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_run_returns_value_and_frames_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let echo = RecordingEcho::new();

    let sup = RunSupervisor::builder("scenario-a")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(echo.clone())
        .with_credential(|| Some("key".to_string()))
        .build();
    let run = sup.run_handle();

    let res = sup
        .run(|ctx| {
            writeln!(ctx.stdout(), "a").map_err(|e| e.to_string())?;
            std::thread::sleep(Duration::from_millis(30));
            writeln!(ctx.stdout(), "b").map_err(|e| e.to_string())?;
            Ok::<_, String>(42)
        })
        .await;

    assert_eq!(res.unwrap(), 42);
    assert_eq!(run.state(), RunState::Succeeded);
    assert!(run.end_time().is_some());

    assert_framed(&transport.kinds());
    assert_eq!(last_status(&transport), Some(FinalStatus::Success));
    assert!(transport.log_text(Level::Info).starts_with("a\nb\n"));

    let echoed = echo.stdout_text();
    assert!(echoed.starts_with("a\nb\n"));
    assert!(echoed.contains("Logs for this run of scenario-a are available locally at:"));
    assert!(echoed.contains("scenario-a finished with status success after 0:00:0"));

    let files = log_files(dir.path());
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert!(content.starts_with("a\nb\n"));
    assert!(content.contains("finished with status success"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_run_returns_the_same_error() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    let res = RunSupervisor::builder("scenario-b")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|ctx| {
            writeln!(ctx.stderr(), "Traceback: ValueError").ok();
            Err::<(), _>("ValueError: boom".to_string())
        })
        .await;

    match res {
        Err(RunError::Failed(e)) => assert_eq!(e, "ValueError: boom"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_framed(&transport.kinds());
    assert_eq!(last_status(&transport), Some(FinalStatus::Failure));
    assert!(transport.log_text(Level::Error).contains("Traceback: ValueError"));
}

#[tokio::test(flavor = "multi_thread")]
async fn panic_is_reported_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    let res = RunSupervisor::builder("panics")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|_ctx| -> Result<(), String> { panic!("kaboom") })
        .await;

    match res {
        Err(RunError::Panicked { message }) => assert!(message.contains("kaboom")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(last_status(&transport), Some(FinalStatus::Failure));
}

#[tokio::test(flavor = "multi_thread")]
async fn token_cancellation_reports_user_canceled() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let token = CancellationToken::new();

    let sup = RunSupervisor::builder("canceled")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .with_cancel_token(token.clone())
        .build();
    let run = sup.run_handle();
    let mut rx = sup.bus().subscribe();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let res = sup
        .run(|ctx| {
            while !ctx.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            std::thread::sleep(Duration::from_millis(200));
            Ok::<(), String>(())
        })
        .await;

    assert!(matches!(res, Err(RunError::Canceled)));
    assert_eq!(run.state(), RunState::Canceled);
    assert_eq!(last_status(&transport), Some(FinalStatus::UserCanceled));

    let events = drain_events(&mut rx);
    let shutdown = events
        .iter()
        .find(|e| e.kind == EventKind::ShutdownRequested)
        .expect("shutdown event");
    assert_eq!(shutdown.reason.as_deref(), Some("token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::scripted([
        SendOutcome::Delivered,
        SendOutcome::Transient("503".into()),
        SendOutcome::Transient("503".into()),
    ]);

    let res = RunSupervisor::builder("flaky")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|ctx| {
            writeln!(ctx.stdout(), "x").ok();
            std::thread::sleep(Duration::from_millis(50));
            writeln!(ctx.stdout(), "y").ok();
            Ok::<_, String>(())
        })
        .await;

    assert!(res.is_ok());
    let kinds = transport.kinds();
    assert_framed(&kinds);
    assert_eq!(transport.attempts().len(), kinds.len() + 2);
    assert!(transport.log_text(Level::Info).starts_with("x\ny\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_collector_does_not_hold_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::always(SendOutcome::Unauthorized("401".into()));

    let sup = RunSupervisor::builder("no-key")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build();
    let mut rx = sup.bus().subscribe();

    let started = Instant::now();
    let res = sup.run(|_ctx| Ok::<_, String>("done")).await;

    assert_eq!(res.unwrap(), "done");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(transport.sent().is_empty());

    let events = drain_events(&mut rx);
    let unauthorized = events
        .iter()
        .filter(|e| e.kind == EventKind::Unauthorized)
        .count();
    assert_eq!(unauthorized, 1);

    let settled = events
        .iter()
        .find(|e| e.kind == EventKind::DrainCompleted)
        .expect("drain settled");
    assert_eq!(settled.reason.as_deref(), Some("unauthorized"));
    assert!(settled.count.unwrap_or(0) > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_drain_is_reported_as_drained() {
    let dir = tempfile::tempdir().unwrap();
    let sup = RunSupervisor::builder("clean")
        .with_config(test_config(dir.path()))
        .with_transport(RecordingTransport::new())
        .with_echo(RecordingEcho::new())
        .build();
    let mut rx = sup.bus().subscribe();

    sup.run(|_ctx| Ok::<_, String>(())).await.unwrap();

    let settled = drain_events(&mut rx)
        .into_iter()
        .find(|e| e.kind == EventKind::DrainCompleted)
        .expect("drain settled");
    assert_eq!(settled.reason.as_deref(), Some("drained"));
    assert_eq!(settled.count, Some(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn large_output_is_chunked() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let mut cfg = test_config(dir.path());
    cfg.max_chunk_bytes = 64;

    let huge: String = ('a'..='z').cycle().take(1000).collect();
    let expected = format!("{huge}\n字\n");
    let written = expected.clone();

    RunSupervisor::builder("huge")
        .with_config(cfg)
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(move |ctx| {
            ctx.stdout().write_all(written.as_bytes())?;
            Ok::<_, std::io::Error>(())
        })
        .await
        .unwrap();

    for env in transport.sent() {
        if let Payload::Log { body, .. } = env.payload() {
            assert!(body.len() <= 64, "chunk of {} bytes", body.len());
        }
    }
    assert!(transport.log_text(Level::Info).starts_with(&expected));

    let content = std::fs::read_to_string(&log_files(dir.path())[0]).unwrap();
    assert!(content.starts_with(&expected));
}

#[tokio::test(flavor = "multi_thread")]
async fn iteration_and_metrics_keep_call_order() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    RunSupervisor::builder("iterate")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|ctx| {
            for i in ctx.client().iter(3)? {
                ctx.client().metric("loss", i as f64)?;
            }
            Ok::<_, ValidationError>(())
        })
        .await
        .unwrap();

    let trail: Vec<String> = transport
        .sent()
        .iter()
        .filter_map(|e| match e.payload() {
            Payload::Param {
                params,
                is_internal: true,
            } => {
                assert_eq!(params.get("hd_iter_0_epochs"), Some(&json!(3)));
                Some("param".to_string())
            }
            Payload::Metric { name, value, .. } => Some(format!("{name}={value}")),
            _ => None,
        })
        .collect();

    assert_eq!(
        trail,
        [
            "param",
            "hd_iter_0=0",
            "loss=0",
            "hd_iter_0=1",
            "loss=1",
            "hd_iter_0=2",
            "loss=2"
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limited_iteration_reports_first_and_last_index() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let mut cfg = test_config(dir.path());
    cfg.metric_interval = jobvisor::Config::default().metric_interval;

    RunSupervisor::builder("iterate-limited")
        .with_config(cfg)
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|ctx| {
            let seen: Vec<u64> = ctx.client().iter(3)?.collect();
            assert_eq!(seen, [0, 1, 2]);
            Ok::<_, ValidationError>(())
        })
        .await
        .unwrap();

    let progress: Vec<f64> = transport
        .sent()
        .iter()
        .filter_map(|e| match e.payload() {
            Payload::Metric {
                name,
                value,
                is_internal: true,
            } if name == "hd_iter_0" => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(progress, [0.0, 2.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limited_metric_sends_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let mut cfg = test_config(dir.path());
    cfg.metric_interval = Duration::from_secs(1);

    let admitted = RunSupervisor::builder("rate")
        .with_config(cfg)
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|ctx| {
            let first = ctx.client().metric("loss", 0.5)?;
            let second = ctx.client().metric("loss", 0.4)?;
            Ok::<_, ValidationError>((first, second))
        })
        .await
        .unwrap();

    assert_eq!(admitted, (true, false));
    let metrics = transport
        .sent()
        .iter()
        .filter(|e| matches!(e.payload(), Payload::Metric { name, .. } if name == "loss"))
        .count();
    assert_eq!(metrics, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_param_is_rejected_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    let second = RunSupervisor::builder("params")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|ctx| {
            ctx.client().param("lr", 0.01).map_err(|e| e.to_string())?;
            Ok::<_, String>(ctx.client().param("lr", 0.02).is_err())
        })
        .await
        .unwrap();

    assert!(second);
    let params = transport
        .sent()
        .iter()
        .filter(|e| e.kind() == "param")
        .count();
    assert_eq!(params, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unusable_log_dir_does_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let echo = RecordingEcho::new();

    let sup = RunSupervisor::builder("no-disk")
        .with_config(test_config(&blocker))
        .with_transport(RecordingTransport::new())
        .with_echo(echo.clone())
        .build();
    let mut rx = sup.bus().subscribe();

    let res = sup.run(|_ctx| Ok::<_, String>(())).await;

    assert!(res.is_ok());
    assert!(echo
        .stdout_text()
        .contains("Logs for this run of no-disk could not be stored locally"));
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| e.kind == EventKind::LogFileUnavailable));
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_observe_the_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());

    RunSupervisor::builder("observed")
        .with_config(test_config(dir.path()))
        .with_transport(RecordingTransport::new())
        .with_echo(RecordingEcho::new())
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build()
        .run(|_ctx| Ok::<_, String>(()))
        .await
        .unwrap();

    let kinds = recorder.kinds.lock().unwrap().clone();
    let pos = |k: EventKind| kinds.iter().position(|x| *x == k);
    assert!(pos(EventKind::RunStarted) < pos(EventKind::RunFinished));
    assert!(pos(EventKind::RunFinished) < pos(EventKind::DrainCompleted));
    assert!(pos(EventKind::RunStarted).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn async_code_is_supervised() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    let res = RunSupervisor::builder("async")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run_async(|ctx| async move {
            ctx.stdout().write_text("step 1\n");
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctx.stdout().write_text("step 2\n");
            Ok::<_, String>(7)
        })
        .await;

    assert_eq!(res.unwrap(), 7);
    assert_framed(&transport.kinds());
    assert!(transport.log_text(Level::Info).starts_with("step 1\nstep 2\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn tracing_in_monitored_code_is_captured() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let echo = RecordingEcho::new();

    RunSupervisor::builder("traced")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(echo.clone())
        .build()
        .run(|_ctx| {
            tracing::info!(epoch = 1, "epoch finished");
            tracing::debug!("below the capture filter");
            Ok::<_, String>(())
        })
        .await
        .unwrap();

    let relayed = transport.log_text(Level::Info);
    assert!(relayed.contains("epoch finished epoch=1"));
    assert!(!relayed.contains("below the capture filter"));
    assert!(echo.stdout_text().contains("epoch finished"));

    let content = std::fs::read_to_string(&log_files(dir.path())[0]).unwrap();
    assert!(content.contains("epoch finished"));
}

#[tokio::test(flavor = "multi_thread")]
async fn tracing_in_async_code_is_captured() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    RunSupervisor::builder("traced-async")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run_async(|_ctx| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tracing::warn!(loss = 9.5, "loss diverged");
            Ok::<_, String>(())
        })
        .await
        .unwrap();

    let relayed = transport.log_text(Level::Info);
    assert!(relayed.contains("WARN"));
    assert!(relayed.contains("loss diverged loss=9.5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn tracing_capture_can_be_turned_off() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();
    let mut cfg = test_config(dir.path());
    cfg.capture_tracing = None;

    RunSupervisor::builder("untraced")
        .with_config(cfg)
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run(|_ctx| {
            tracing::info!("not captured");
            Ok::<_, String>(())
        })
        .await
        .unwrap();

    assert!(!transport.log_text(Level::Info).contains("not captured"));
}

#[tokio::test(flavor = "multi_thread")]
async fn clock_starts_when_the_run_starts() {
    let dir = tempfile::tempdir().unwrap();
    let sup = RunSupervisor::builder("late")
        .with_config(test_config(dir.path()))
        .with_transport(RecordingTransport::new())
        .with_echo(RecordingEcho::new())
        .build();
    let run = sup.run_handle();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let before_run = chrono::Local::now();
    sup.run(|_ctx| Ok::<_, String>(())).await.unwrap();

    assert!(run.start_time() >= before_run);
}

#[test]
fn run_blocking_builds_its_own_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    let res = RunSupervisor::builder("sync")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run_blocking(|ctx| {
            writeln!(ctx.stdout(), "hello").map_err(|e| e.to_string())?;
            Ok::<_, String>(())
        });

    assert!(res.is_ok());
    assert_eq!(last_status(&transport), Some(FinalStatus::Success));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn child_process_output_is_captured() {
    use jobvisor::command::pipe_command;
    use tokio::process::Command;

    let dir = tempfile::tempdir().unwrap();
    let transport = RecordingTransport::new();

    let status = RunSupervisor::builder("child")
        .with_config(test_config(dir.path()))
        .with_transport(transport.clone())
        .with_echo(RecordingEcho::new())
        .build()
        .run_async(|ctx| async move {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg("echo out; echo err 1>&2; exit 3");
            pipe_command(&ctx, cmd).await
        })
        .await
        .unwrap();

    assert_eq!(status.code(), Some(3));
    assert!(transport.log_text(Level::Info).starts_with("out\n"));
    assert_eq!(transport.log_text(Level::Error), "err\n");
}
