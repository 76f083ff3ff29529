use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use strata::strata_core::SameThreadExecutor;
use strata::{CacheManager, CacheManagerBuilder, InvocationContext, Operation, OperationDescriptor, PolicyDeclaration, Value};

fn manager() -> CacheManager<i64, String> {
    CacheManagerBuilder::new()
        .executor("inline", Arc::new(SameThreadExecutor))
        .build()
}

fn versioned(descriptor: OperationDescriptor, calls: &Arc<AtomicUsize>) -> Operation<String> {
    let calls = Arc::clone(calls);
    Operation::new(descriptor, move |args: &[Value]| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}@v{}", args[0], n))
    })
}

fn refreshing(name: &str, weak: bool) -> OperationDescriptor {
    OperationDescriptor::new("Rates", name).caches(["rates"]).method_policy(
        PolicyDeclaration::new()
            .refresh_after_write(100)
            .executor("inline")
            .weak_arguments(weak),
    )
}

fn call(op: &Operation<String>, id: i64) -> InvocationContext<String> {
    InvocationContext::new(op.clone(), vec![Value::Int(id)])
}

#[test]
fn test_stale_value_served_then_reloaded() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let op = versioned(refreshing("current", false), &calls);

    assert_eq!(manager.invoke(&call(&op, 1), 1).unwrap(), "1@v1");
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v1".to_string()));

    sleep(Duration::from_millis(150));
    // The read that notices staleness still gets the old value.
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v1".to_string()));
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v2".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_reload_uses_the_original_arguments() {
    let manager = manager();
    let op = versioned(refreshing("by_id", false), &Arc::new(AtomicUsize::new(0)));

    manager.invoke(&call(&op, 7), 7).unwrap();
    sleep(Duration::from_millis(150));
    // Asked through a call with other arguments: the entry's own invoker reloads.
    manager.get(&call(&op, 99), &7).unwrap();
    let value = manager.get(&call(&op, 99), &7).unwrap().unwrap();
    assert!(value.starts_with("7@"), "{value}");
}

#[test]
fn test_strong_arguments_survive_reclaim() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let op = versioned(refreshing("strong", false), &calls);

    manager.invoke(&call(&op, 1), 1).unwrap();
    manager.arguments().reclaim_all();
    sleep(Duration::from_millis(150));

    manager.get(&call(&op, 1), &1).unwrap();
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v2".to_string()));
}

#[test]
fn test_reclaimed_arguments_drop_entry_then_cold_load() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let op = versioned(refreshing("weak", true), &calls);

    assert_eq!(manager.invoke(&call(&op, 1), 1).unwrap(), "1@v1");
    assert_eq!(manager.arguments().len(), 1);

    manager.arguments().reclaim_all();
    sleep(Duration::from_millis(150));

    // Stale read triggers a refresh that cannot run: the mapping goes away.
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v1".to_string()));
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(manager.invoke(&call(&op, 1), 1).unwrap(), "1@v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_removing_an_entry_releases_its_arguments() {
    let manager = manager();
    let op = versioned(refreshing("release", true), &Arc::new(AtomicUsize::new(0)));

    manager.invoke(&call(&op, 1), 1).unwrap();
    manager.invoke(&call(&op, 2), 2).unwrap();
    assert_eq!(manager.arguments().len(), 2);

    manager.evict(&call(&op, 1), &1).unwrap();
    assert_eq!(manager.arguments().len(), 1);

    manager.evict_all(&call(&op, 1)).unwrap();
    assert!(manager.arguments().is_empty());
}

#[test]
fn test_cache_hits_do_not_retain_arguments() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new()
        .executor("inline", Arc::new(SameThreadExecutor))
        .argument_capacity(2)
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let op = versioned(refreshing("hits", true), &calls);

    manager.invoke(&call(&op, 1), 1).unwrap();
    manager.invoke(&call(&op, 2), 2).unwrap();
    assert_eq!(manager.arguments().len(), 2);

    for _ in 0..3 {
        assert_eq!(manager.get(&call(&op, 2), &2).unwrap(), Some("2@v2".to_string()));
        assert_eq!(manager.invoke(&call(&op, 2), 2).unwrap(), "2@v2");
    }
    assert_eq!(manager.arguments().len(), 2);
    manager.evict(&call(&op, 2), &2).unwrap();
    assert_eq!(manager.arguments().len(), 1);

    // Entry 1 kept its arguments through all those reads and still reloads.
    sleep(Duration::from_millis(150));
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v1".to_string()));
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v3".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_caches_of_one_call_share_retained_arguments() {
    let manager = manager();
    let op = versioned(
        OperationDescriptor::new("Rates", "shared")
            .caches(["rates-a", "rates-b"])
            .method_policy(PolicyDeclaration::new().weak_arguments(true)),
        &Arc::new(AtomicUsize::new(0)),
    );

    manager.invoke(&call(&op, 1), 1).unwrap();
    assert_eq!(manager.arguments().len(), 1);

    manager.cache("rates-a").unwrap().cache().invalidate(&1);
    assert_eq!(manager.arguments().len(), 1);
    manager.cache("rates-b").unwrap().cache().invalidate(&1);
    assert!(manager.arguments().is_empty());
}

#[test]
fn test_failed_refresh_keeps_value() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let op = Operation::new(refreshing("flaky", false), {
        let calls = Arc::clone(&calls);
        move |_: &[Value]| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("good".to_string())
            } else {
                Err("upstream timeout".into())
            }
        }
    });

    assert_eq!(manager.invoke(&call(&op, 1), 1).unwrap(), "good");
    sleep(Duration::from_millis(150));
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("good".to_string()));
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("good".to_string()));
    assert!(calls.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_refresh_on_background_thread() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new().build();
    let calls = Arc::new(AtomicUsize::new(0));
    let op = versioned(
        OperationDescriptor::new("Rates", "async")
            .caches(["async-rates"])
            .method_policy(PolicyDeclaration::new().refresh_after_write(100)),
        &calls,
    );

    manager.invoke(&call(&op, 1), 1).unwrap();
    sleep(Duration::from_millis(150));
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v1".to_string()));

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if manager.get(&call(&op, 1), &1).unwrap().as_deref() == Some("1@v2") {
            break;
        }
        assert!(Instant::now() < deadline, "refresh never completed");
        sleep(Duration::from_millis(10));
    }
}

#[cfg(feature = "tokio")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refresh_on_tokio_executor() {
    use strata::strata_core::TokioExecutor;

    let executor = TokioExecutor::try_current().expect("inside a runtime");
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new()
        .executor("tokio", Arc::new(executor))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let op = versioned(
        OperationDescriptor::new("Rates", "tokio")
            .caches(["tokio-rates"])
            .method_policy(PolicyDeclaration::new().refresh_after_write(50).executor("tokio")),
        &calls,
    );

    manager.invoke(&call(&op, 1), 1).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.get(&call(&op, 1), &1).unwrap(), Some("1@v1".to_string()));

    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.get(&call(&op, 1), &1).unwrap().as_deref() != Some("1@v2") {
        assert!(Instant::now() < deadline, "refresh never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
