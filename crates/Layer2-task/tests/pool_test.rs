//! Worker pool 통합 테스트
//!
//! 테스트 바이너리 자신을 worker로 다시 실행한다 (`worker_entry_point`).
//!
//! `cargo test -p docpool-task --test pool_test`

use docpool_foundation::{Error, RemoteError};
use docpool_task::{
    init_worker, is_worker_process, Job, PoolConfig, WorkerCommand, WorkerPool, WorkerRuntime,
};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

fn sleep_ms(value: &Value) {
    std::thread::sleep(Duration::from_millis(value.as_u64().unwrap_or(0)));
}

/// Worker process body. Ignored so it only runs when re-executed.
#[test]
#[ignore]
fn worker_entry_point() {
    if !is_worker_process() {
        return;
    }
    init_worker();

    let result = WorkerRuntime::new()
        .handler("echo", Ok)
        .handler("pid", |_| Ok(json!(std::process::id())))
        .handler("sleep", |v| {
            sleep_ms(&v);
            Ok(json!(std::process::id()))
        })
        .handler("fail", |_| Err(Error::parse_failure("bad markup")))
        .handler("custom", |_| {
            Err(Error::Remote(RemoteError::new("ValueError", "boom")))
        })
        .handler("panic", |_| panic!("parser exploded"))
        .handler("exit", |_| std::process::exit(3))
        .serve();

    std::process::exit(if result.is_ok() { 0 } else { 1 });
}

fn worker_command() -> WorkerCommand {
    WorkerCommand::current_exe()
        .expect("current exe")
        .args(["worker_entry_point", "--exact", "--ignored", "--nocapture", "-q", "--test-threads=1"])
}

fn pool_with(workers: usize) -> WorkerPool {
    let config = PoolConfig::default()
        .with_max_workers(workers)
        .with_max_tasks_per_worker(0)
        .with_task_timeout(Duration::from_secs(10))
        .with_startup_timeout(Duration::from_secs(30))
        .with_memory_limit(0);
    WorkerPool::new(worker_command(), config)
}

async fn pid_of(pool: &WorkerPool) -> u64 {
    pool.execute(Job::new("pid", Value::Null))
        .await
        .expect("pid task")
        .as_u64()
        .expect("pid is a number")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_echo() {
    let pool = pool_with(1);
    let out = pool
        .execute(Job::new("echo", json!({"url": "http://example.org/"})))
        .await
        .unwrap();
    assert_eq!(out, json!({"url": "http://example.org/"}));

    let stats = pool.stats();
    assert_eq!(stats.tasks_completed, 1);
    assert_eq!(stats.workers_spawned, 1);
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_kills_worker_and_pool_recovers() {
    let pool = pool_with(1);
    let first_pid = pid_of(&pool).await;

    let started = Instant::now();
    let err = pool
        .execute(Job::new("sleep", json!(5000)).with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{:?}", err);
    assert!(err.is_no_parser());
    assert!(started.elapsed() < Duration::from_secs(4), "{:?}", started.elapsed());

    // 다음 작업은 새 worker에서 정상 처리
    let second_pid = pid_of(&pool).await;
    assert_ne!(first_pid, second_pid);

    let stats = pool.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.workers_killed, 1);
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_errors_cross_the_process_boundary() {
    let pool = pool_with(1);

    match pool.execute(Job::new("fail", Value::Null)).await {
        Err(Error::ParseFailure(message)) => assert_eq!(message, "bad markup"),
        other => panic!("unexpected {:?}", other),
    }

    match pool.execute(Job::new("custom", Value::Null)).await {
        Err(Error::Remote(remote)) => {
            assert_eq!(remote.kind, "ValueError");
            assert_eq!(remote.message, "boom");
        }
        other => panic!("unexpected {:?}", other),
    }

    match pool.execute(Job::new("panic", Value::Null)).await {
        Err(Error::Remote(remote)) => {
            assert_eq!(remote.kind, "Panic");
            assert!(remote.message.contains("parser exploded"));
        }
        other => panic!("unexpected {:?}", other),
    }

    // panic 이후에도 같은 worker가 계속 동작
    assert_eq!(pool.stats().workers_spawned, 1);
    assert_eq!(pool.execute(Job::new("echo", json!(1))).await.unwrap(), json!(1));
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_jobs_run_in_parallel() {
    let pool = pool_with(2);
    pool.start().await.unwrap();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        pool.execute(Job::new("sleep", json!(800))),
        pool.execute(Job::new("sleep", json!(800))),
    );
    let elapsed = started.elapsed();

    assert_ne!(a.unwrap(), b.unwrap());
    assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_three_jobs_on_two_workers() {
    let pool = pool_with(2);
    pool.start().await.unwrap();

    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        pool.execute(Job::new("sleep", json!(200))),
        pool.execute(Job::new("sleep", json!(200))),
        pool.execute(Job::new("sleep", json!(200))),
    );
    let elapsed = started.elapsed();

    // 2개가 먼저, 나머지 1개는 빈 worker를 기다림
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(600), "{:?}", elapsed);
    assert_eq!(pool.stats().workers_spawned, 2);
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_fires_on_time() {
    let pool = pool_with(1);
    pool.start().await.unwrap();

    let started = Instant::now();
    let err = pool
        .execute(Job::new("sleep", json!(5000)).with_timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, Error::Timeout(_)), "{:?}", err);
    assert!(elapsed >= Duration::from_secs(1), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);

    assert_eq!(pool.execute(Job::new("echo", json!("next"))).await.unwrap(), json!("next"));
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_counts_workers_spawned_on_demand() {
    let pool = pool_with(2);

    // start() 없이 schedule → checkout이 worker 하나를 띄움
    let handle = pool.schedule(Job::new("pid", Value::Null)).unwrap();
    handle.result().await.unwrap();
    let parked = Instant::now();
    while pool.stats().idle_workers < 1 && parked.elapsed() < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.stats().workers_spawned, 1);

    pool.start().await.unwrap();
    let stats = pool.stats();
    assert_eq!(stats.workers_spawned, 2);
    assert_eq!(stats.idle_workers, 2);
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_recycled_after_max_tasks() {
    let config = PoolConfig::default()
        .with_max_workers(1)
        .with_max_tasks_per_worker(2)
        .with_startup_timeout(Duration::from_secs(30))
        .with_memory_limit(0);
    let pool = WorkerPool::new(worker_command(), config);

    let first = pid_of(&pool).await;
    let second = pid_of(&pool).await;
    let third = pid_of(&pool).await;

    assert_eq!(first, second);
    assert_ne!(second, third);
    assert_eq!(pool.stats().workers_retired, 1);
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crashed_worker_is_replaced() {
    let pool = pool_with(1);

    let err = pool.execute(Job::new("exit", Value::Null)).await.unwrap_err();
    assert!(matches!(err, Error::WorkerDied(_)), "{:?}", err);
    assert!(err.is_no_parser());

    assert_eq!(pool.execute(Job::new("echo", json!("ok"))).await.unwrap(), json!("ok"));
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_hook_sees_worker_pid() {
    let pool = pool_with(1);
    let (tx, rx) = std::sync::mpsc::channel();

    let pid = pool
        .execute(Job::new("pid", Value::Null).on_start(move |pid| {
            let _ = tx.send(pid);
        }))
        .await
        .unwrap();

    assert_eq!(rx.recv().unwrap() as u64, pid.as_u64().unwrap());
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_large_payloads_spill() {
    let config = PoolConfig::default()
        .with_max_workers(1)
        .with_spill_threshold(1024)
        .with_startup_timeout(Duration::from_secs(30))
        .with_memory_limit(0);
    let pool = WorkerPool::new(worker_command(), config);

    let body = "A".repeat(200_000);
    let out = pool.execute(Job::new("echo", json!(body))).await.unwrap();
    assert_eq!(out.as_str().map(str::len), Some(200_000));
    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_is_idempotent() {
    let pool = pool_with(1);
    pool.start().await.unwrap();
    assert_eq!(pool.stats().idle_workers, 1);

    pool.stop().await;
    pool.stop().await;

    assert_eq!(pool.stats().idle_workers, 0);
    assert!(matches!(
        pool.execute(Job::new("echo", Value::Null)).await,
        Err(Error::PoolClosed)
    ));
}
