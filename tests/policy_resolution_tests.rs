use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strata::expression::{CompiledExpression, ExpressionEngine, ExpressionError};
use strata::strata_core::SameThreadExecutor;
use strata::{
    CacheError, CacheManager, CacheManagerBuilder, CacheProperties, InvocationContext, Operation, OperationDescriptor,
    PolicyDeclaration, Setting, SimpleExpressionEngine, Value,
};

fn echo(descriptor: OperationDescriptor) -> Operation<String> {
    Operation::new(descriptor, |args: &[Value]| Ok(format!("{}", args[0])))
}

#[test]
fn test_layers_merge_from_global_to_operation() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new()
        .properties(CacheProperties {
            maximum_size: Some(100),
            expire_after_write: Some(60_000),
            refresh_after_write: Some(30_000),
            ..Default::default()
        })
        .executor("inline", Arc::new(SameThreadExecutor))
        .build();

    let op = echo(
        OperationDescriptor::new("Catalog", "item")
            .caches(["items"])
            .type_policy(PolicyDeclaration::new().maximum_size(200).executor("inline"))
            .method_policy(PolicyDeclaration::new().expire_after_access(5_000)),
    );
    let call = InvocationContext::new(op, vec![Value::Int(1)]);

    let caches = manager.resolve_caches(&call).unwrap();
    assert_eq!(caches.len(), 1);
    let policy = &caches[0].context().policy;
    assert_eq!(policy.maximum_size, Some(200));
    assert_eq!(policy.expire_after_write, Some(60_000));
    assert_eq!(policy.expire_after_access, Some(5_000));
    assert_eq!(policy.refresh_after_write, Some(30_000));
    assert_eq!(policy.executor.as_ref().map(|e| e.name()), Some("inline"));
    assert!(!policy.weak_arguments);

    let instance = manager.cache("items").unwrap();
    assert_eq!(instance.maximum(), Some(200));
    assert_eq!(instance.refresh_after_write(), Some(Duration::from_secs(30)));
}

#[test]
fn test_shared_cache_widens_capacity_and_tightens_refresh() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new().build();

    let small = InvocationContext::new(
        echo(
            OperationDescriptor::new("Reports", "daily")
                .caches(["reports"])
                .method_policy(PolicyDeclaration::new().maximum_size(10).refresh_after_write(5_000)),
        ),
        vec![Value::Int(1)],
    );
    let large = InvocationContext::new(
        echo(
            OperationDescriptor::new("Reports", "monthly")
                .caches(["reports"])
                .method_policy(PolicyDeclaration::new().maximum_size(50).refresh_after_write(1_000)),
        ),
        vec![Value::Int(2)],
    );

    manager.invoke(&small, 1).unwrap();
    let instance = manager.cache("reports").unwrap();
    assert_eq!(instance.maximum(), Some(10));
    assert_eq!(instance.refresh_after_write(), Some(Duration::from_secs(5)));

    manager.invoke(&large, 2).unwrap();
    assert_eq!(instance.maximum(), Some(50));
    assert_eq!(instance.refresh_after_write(), Some(Duration::from_secs(1)));

    // Neither setting moves back.
    manager.invoke(&small, 3).unwrap();
    assert_eq!(instance.maximum(), Some(50));
    assert_eq!(instance.refresh_after_write(), Some(Duration::from_secs(1)));
    assert_eq!(manager.cache_names(), vec!["reports".to_string()]);
}

#[test]
fn test_unconfigured_cache_is_unbounded_and_grows_no_further() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new().build();
    let plain = InvocationContext::new(
        echo(OperationDescriptor::new("Plain", "get").caches(["plain"])),
        vec![Value::Int(1)],
    );
    let bounded = InvocationContext::new(
        echo(
            OperationDescriptor::new("Plain", "bounded")
                .caches(["plain"])
                .method_policy(PolicyDeclaration::new().maximum_size(5)),
        ),
        vec![Value::Int(1)],
    );

    manager.invoke(&plain, 1).unwrap();
    manager.invoke(&bounded, 2).unwrap();
    assert_eq!(manager.cache("plain").unwrap().maximum(), None);
}

#[test]
fn test_expression_settings_follow_arguments() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new().build();
    let op = echo(
        OperationDescriptor::new("Pages", "load")
            .parameters(["page", "size"])
            .caches(["pages"])
            .method_policy(
                PolicyDeclaration::new()
                    .maximum_size(Setting::expr("#size * 100"))
                    .expire_after_write(Setting::expr("max(#page, 1) * 1000")),
            ),
    );

    let first = InvocationContext::new(op.clone(), vec![Value::Int(0), Value::Int(2)]);
    let caches = manager.resolve_caches(&first).unwrap();
    assert_eq!(caches[0].context().policy.maximum_size, Some(200));
    assert_eq!(caches[0].context().policy.expire_after_write, Some(1_000));

    let second = InvocationContext::new(op, vec![Value::Int(7), Value::Int(5)]);
    let caches = manager.resolve_caches(&second).unwrap();
    assert_eq!(caches[0].context().policy.maximum_size, Some(500));
    assert_eq!(caches[0].context().policy.expire_after_write, Some(7_000));
    assert_eq!(manager.cache("pages").unwrap().maximum(), Some(500));
}

struct CountingEngine {
    parses: Arc<AtomicUsize>,
}

impl ExpressionEngine for CountingEngine {
    fn parse(&self, text: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        SimpleExpressionEngine.parse(text)
    }
}

#[test]
fn test_each_site_compiles_once() {
    let parses = Arc::new(AtomicUsize::new(0));
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new()
        .expression_engine(Arc::new(CountingEngine {
            parses: Arc::clone(&parses),
        }))
        .build();

    // Same text at two sites compiles twice.
    let op = echo(
        OperationDescriptor::new("Users", "find")
            .parameters(["id"])
            .type_policy(PolicyDeclaration::new().maximum_size(Setting::expr("#id + 10")))
            .method_policy(PolicyDeclaration::new().maximum_size(Setting::expr("#id + 10"))),
    );

    for id in 0..20 {
        let call = InvocationContext::new(op.clone(), vec![Value::Int(id)]);
        manager.invoke(&call, id).unwrap();
    }

    assert_eq!(parses.load(Ordering::SeqCst), 2);
    assert_eq!(manager.evaluator().compiled_len(), 2);
}

#[test]
fn test_missing_executor_fails_before_any_cache_exists() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new()
        .properties(CacheProperties {
            executor: Some("background".to_string()),
            ..Default::default()
        })
        .build();
    let call = InvocationContext::new(
        echo(OperationDescriptor::new("Users", "find").caches(["users"])),
        vec![Value::Int(1)],
    );

    match manager.invoke(&call, 1) {
        Err(CacheError::MissingExecutor(name)) => assert_eq!(name, "background"),
        other => panic!("expected missing executor, got {other:?}"),
    }
    assert!(manager.cache("users").is_none());
}

#[test]
fn test_bad_expression_surfaces_site() {
    let manager: CacheManager<i64, String> = CacheManagerBuilder::new().build();
    let call = InvocationContext::new(
        echo(
            OperationDescriptor::new("Users", "find")
                .method_policy(PolicyDeclaration::new().expire_after_access(Setting::expr("10 / 0"))),
        ),
        vec![Value::Int(1)],
    );

    let err = manager.invoke(&call, 1).unwrap_err();
    assert!(err.is_configuration());
    let message = err.to_string();
    assert!(message.contains("10 / 0"), "{message}");
    assert!(message.contains("Users::find"), "{message}");
}

mod env {
    use super::*;
    use serial_test::serial;
    use strata::config::{ENV_EXPIRE_AFTER_WRITE, ENV_MAXIMUM_SIZE};

    fn clear() {
        std::env::remove_var(ENV_MAXIMUM_SIZE);
        std::env::remove_var(ENV_EXPIRE_AFTER_WRITE);
    }

    #[test]
    #[serial]
    fn test_properties_from_environment() {
        clear();
        std::env::set_var(ENV_MAXIMUM_SIZE, "42");
        std::env::set_var(ENV_EXPIRE_AFTER_WRITE, " 1500 ");

        let properties = CacheProperties::from_env().unwrap();
        clear();
        assert_eq!(properties.maximum_size, Some(42));
        assert_eq!(properties.expire_after_write, Some(1_500));

        let manager: CacheManager<i64, String> = CacheManagerBuilder::new().properties(properties).build();
        let call = InvocationContext::new(
            echo(OperationDescriptor::new("Env", "load").caches(["env"])),
            vec![Value::Int(1)],
        );
        manager.invoke(&call, 1).unwrap();
        assert_eq!(manager.cache("env").unwrap().maximum(), Some(42));
    }

    #[test]
    #[serial]
    fn test_invalid_environment_value() {
        clear();
        std::env::set_var(ENV_MAXIMUM_SIZE, "plenty");
        let result = CacheProperties::from_env();
        clear();

        match result {
            Err(CacheError::Config { key, value, .. }) => {
                assert_eq!(key, ENV_MAXIMUM_SIZE);
                assert_eq!(value, "plenty");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_empty_environment() {
        clear();
        let properties = CacheProperties::from_env().unwrap();
        assert_eq!(properties.maximum_size, None);
        assert_eq!(properties.expire_after_write, None);
    }
}
