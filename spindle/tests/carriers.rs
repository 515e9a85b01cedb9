use spindle::{CarrierState, Handle, RuntimeBuilder};
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_single_carrier() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();

    let result = rt.block_on(async { 42 }).unwrap();
    assert_eq!(result, 42);
    assert_eq!(rt.carrier_states().len(), 1);
}

#[test]
fn test_multiple_carriers() {
    let rt = RuntimeBuilder::new().carrier_count(4).build().unwrap();

    let result = rt.block_on(async { 100 }).unwrap();
    assert_eq!(result, 100);
    assert_eq!(rt.carrier_states().len(), 4);
}

#[test]
#[should_panic(expected = "carrier_count must be > 0")]
fn test_zero_carriers_panics() {
    let _ = RuntimeBuilder::new().carrier_count(0);
}

#[test]
fn test_carriers_are_named_and_bounded() {
    let rt = RuntimeBuilder::new()
        .carrier_count(3)
        .thread_name("pool")
        .build()
        .unwrap();

    let names = Arc::new(Mutex::new(HashSet::new()));
    let scope = rt.open_scope();

    for _ in 0..200 {
        let names = names.clone();
        scope
            .submit(async move {
                let name = thread::current().name().map(str::to_owned);
                names.lock().unwrap().insert(name);
                spindle::task::yield_now().await;
                Ok::<_, io::Error>(())
            })
            .unwrap();
    }

    scope.close().unwrap();

    let names = names.lock().unwrap();
    assert!(names.len() <= 3);
    for name in names.iter() {
        let name = name.as_deref().unwrap();
        assert!(name.starts_with("pool-"), "unexpected carrier name {name}");
    }
}

#[test]
fn test_carriers_idle_after_work() {
    let rt = RuntimeBuilder::new().carrier_count(2).build().unwrap();

    rt.block_on(async { spindle::time::sleep(Duration::from_millis(5)).await })
        .unwrap();

    // A carrier flips back to idle right after its last slice.
    thread::sleep(Duration::from_millis(50));
    assert!(
        rt.carrier_states()
            .iter()
            .all(|state| *state == CarrierState::Idle)
    );
}

#[test]
fn test_handle_reachable_from_tasks() {
    let rt = RuntimeBuilder::new().carrier_count(2).build().unwrap();

    assert!(Handle::try_current().is_none());

    let inside = rt.block_on(async { Handle::try_current().is_some() }).unwrap();
    assert!(inside);
}

#[test]
fn test_shutdown_cancels_parked_tasks() {
    let rt = RuntimeBuilder::new().carrier_count(2).build().unwrap();
    let scope = rt.open_scope();

    let handle = scope
        .submit(async {
            spindle::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, io::Error>(())
        })
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    rt.shutdown().unwrap();

    assert!(handle.join().unwrap_err().to_string().contains("cancelled"));
    assert!(scope.close().is_err());
}

#[test]
fn test_submit_after_shutdown_is_rejected() {
    let rt = RuntimeBuilder::new().carrier_count(1).build().unwrap();
    let handle = rt.handle().clone();
    rt.shutdown().unwrap();

    let scope = handle.open_scope();
    let err = scope.submit(async { Ok::<_, io::Error>(()) }).unwrap_err();

    assert!(matches!(
        err,
        spindle::Error::Submission(spindle::SubmissionError::Shutdown)
    ));
}
