use spindle::task::{self, TaskStatus};
use spindle::time::sleep;
use spindle::{Error, RuntimeBuilder, TaskError};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn test_join_is_idempotent() {
    let rt = RuntimeBuilder::new().carrier_count(2).build().unwrap();
    let scope = rt.open_scope();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let handle = scope
        .submit(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(String::from("value"))
        })
        .unwrap();

    assert_eq!(handle.join().unwrap(), "value");
    assert_eq!(handle.join().unwrap(), "value");
    assert_eq!(handle.try_join().unwrap().unwrap(), "value");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    scope.close().unwrap();
}

#[test]
fn test_failure_is_reported_to_every_join() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();
    let scope = rt.open_scope();

    let handle = scope
        .submit(async { Err::<(), _>(io::Error::other("nope")) })
        .unwrap();

    for _ in 0..2 {
        match handle.join() {
            Err(Error::Task(TaskError::Failed { id, .. })) => assert_eq!(id, handle.id()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(handle.status(), TaskStatus::Failed);
    assert!(scope.close().is_err());
}

#[test]
fn test_join_timeout_leaves_the_task_running() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();
    let scope = rt.open_scope();

    let handle = scope
        .submit(async {
            sleep(Duration::from_millis(200)).await;
            Ok::<_, io::Error>(5)
        })
        .unwrap();

    let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(!handle.is_done());

    scope.close().unwrap();
    assert_eq!(*handle.join().unwrap(), 5);
}

#[test]
fn test_try_join_before_completion_is_none() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();
    let scope = rt.open_scope();

    let handle = scope
        .submit(async {
            sleep(Duration::from_millis(50)).await;
            Ok::<_, io::Error>(())
        })
        .unwrap();

    assert!(handle.try_join().is_none());
    scope.close().unwrap();
    assert!(handle.try_join().is_some());
}

#[test]
fn test_joined_inside_a_task_is_a_suspension_point() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();

    let sum = rt
        .block_on(async {
            let scope = spindle::Handle::current().open_scope();

            let producer = scope.submit(async {
                sleep(Duration::from_millis(20)).await;
                Ok::<_, io::Error>(40)
            })?;

            // With one carrier, a blocking join here could never finish.
            let value = *producer.joined().await?;
            scope.close_async().await?;

            Ok::<_, Error>(value + 2)
        })
        .unwrap();

    assert_eq!(sum.unwrap(), 42);
}

#[test]
fn test_blocking_join_on_a_carrier_is_refused() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();
    let scope = rt.open_scope();

    let inner = Arc::new(
        scope
            .submit(async {
                sleep(Duration::from_millis(20)).await;
                Ok::<_, io::Error>(1)
            })
            .unwrap(),
    );

    let target = inner.clone();
    let outer = scope
        .submit(async move {
            let refused = matches!(target.join(), Err(Error::CarrierBlocked(_)));
            Ok::<_, io::Error>(refused)
        })
        .unwrap();

    scope.close().unwrap();
    assert!(*outer.join().unwrap());
    assert_eq!(*inner.join().unwrap(), 1);
}

#[test]
fn test_cancelling_a_running_task_takes_effect_at_its_next_suspension() {
    let rt = RuntimeBuilder::new().carrier_count(2).build().unwrap();
    let scope = rt.open_scope();
    let steps = Arc::new(AtomicUsize::new(0));

    let counter = steps.clone();
    let handle = scope
        .submit(async move {
            while counter.fetch_add(1, Ordering::SeqCst) < 1_000_000 {
                sleep(Duration::from_millis(5)).await;
            }
            Ok::<(), io::Error>(())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(30));
    handle.cancel();

    assert!(matches!(
        handle.join(),
        Err(Error::Task(TaskError::Cancelled { .. }))
    ));

    let after = steps.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(steps.load(Ordering::SeqCst), after);
    assert!(scope.close().is_err());
}

#[test]
fn test_cancellation_flag_is_visible_to_the_body() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();

    let (seen_before, id) = rt
        .block_on(async { (task::is_cancelled(), task::current_id()) })
        .unwrap();

    assert!(!seen_before);
    assert!(id.is_some());
    assert!(!task::is_cancelled());
    assert!(task::current_id().is_none());
}

#[test]
fn test_block_on_resumes_a_panic() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = rt.block_on(async {
            if true {
                panic!("inside block_on");
            }
            0u8
        });
    }));

    let payload = caught.unwrap_err();
    assert_eq!(payload.downcast_ref::<String>().unwrap(), "inside block_on");

    // The runtime survives.
    assert_eq!(rt.block_on(async { 3 }).unwrap(), 3);
}
