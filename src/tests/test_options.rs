use crate::{
    DolphError, RateLimiterOptions, RetryBudget, ScriptSource, Setting, StoreConnection,
    StoreSettings,
};

struct Ctx {
    user: &'static str,
    premium: bool,
}

const CTX: Ctx = Ctx {
    user: "u1",
    premium: true,
};

#[test]
fn key_function_is_required() {
    let err = RateLimiterOptions::<Ctx>::builder().build().unwrap_err();

    assert!(matches!(err, DolphError::MissingOption("key_function")));
    assert_eq!(err.to_string(), "key_function required");
}

#[test]
fn defaults() {
    let options = RateLimiterOptions::<Ctx>::builder()
        .key_function(|ctx: &Ctx| ctx.user.to_string())
        .build()
        .unwrap();

    assert_eq!(options.prefix, "");
    assert_eq!((options.key_function)(&CTX), "u1");
    assert_eq!(options.expiry.resolve(&CTX), 60);
    assert_eq!(options.limit.resolve(&CTX), 100);
    assert!(options.apply_limit.resolve(&CTX));
    assert_eq!(options.rejection_status, 403);
    assert_eq!(options.retry_budget, RetryBudget::default());
    assert_eq!(options.script_source, ScriptSource::embedded());
    assert!(matches!(
        options.store,
        StoreSettings::Connection(ref c) if *c == StoreConnection::default()
    ));
}

#[test]
fn literal_zero_expiry_fails_at_setup() {
    let err = RateLimiterOptions::<Ctx>::builder()
        .key_function(|ctx: &Ctx| ctx.user.to_string())
        .expiry(0)
        .build()
        .unwrap_err();

    assert_eq!(err, "Expiry must be at least 1 second");
}

#[test]
fn derived_settings_resolve_per_call() {
    let options = RateLimiterOptions::<Ctx>::builder()
        .prefix("api:")
        .key_function(|ctx: &Ctx| ctx.user.to_string())
        .expiry_fn(|ctx: &Ctx| if ctx.premium { 10 } else { 60 })
        .limit_fn(|ctx: &Ctx| if ctx.premium { 1000 } else { 10 })
        .apply_limit_fn(|ctx: &Ctx| ctx.user != "admin")
        .rejection_status(429)
        .build()
        .unwrap();

    let basic = Ctx {
        user: "u2",
        premium: false,
    };
    let admin = Ctx {
        user: "admin",
        premium: false,
    };

    assert_eq!(options.prefix, "api:");
    assert_eq!(options.expiry.resolve(&CTX), 10);
    assert_eq!(options.expiry.resolve(&basic), 60);
    assert_eq!(options.limit.resolve(&CTX), 1000);
    assert_eq!(options.limit.resolve(&basic), 10);
    assert!(options.apply_limit.resolve(&basic));
    assert!(!options.apply_limit.resolve(&admin));
    assert_eq!(options.rejection_status, 429);
}

#[test]
fn derived_expiry_is_not_validated_at_setup() {
    assert!(
        RateLimiterOptions::<Ctx>::builder()
            .key_function(|ctx: &Ctx| ctx.user.to_string())
            .expiry_fn(|_| 0)
            .build()
            .is_ok()
    );
}

#[test]
fn setting_debug_hides_closures() {
    let fixed: Setting<Ctx, u64> = Setting::Fixed(5);
    let derived: Setting<Ctx, u64> = Setting::derived(|_| 5);

    assert_eq!(format!("{fixed:?}"), "Fixed(5)");
    assert_eq!(format!("{derived:?}"), "Derived(..)");
    assert_eq!(derived.clone().resolve(&CTX), 5);
}

#[test]
fn store_settings_select_the_source() {
    let client = redis::Client::open("redis://127.0.0.1:6379/").unwrap();

    let options = RateLimiterOptions::<Ctx>::builder()
        .key_function(|ctx: &Ctx| ctx.user.to_string())
        .store_client(client)
        .build()
        .unwrap();
    assert!(matches!(options.store, StoreSettings::Client(_)));

    let connection = StoreConnection {
        host: "cache".to_string(),
        port: 6380,
        ..StoreConnection::default()
    };
    let options = RateLimiterOptions::<Ctx>::builder()
        .key_function(|ctx: &Ctx| ctx.user.to_string())
        .store_connection(connection.clone())
        .script_source(ScriptSource::embedded())
        .retry_budget(RetryBudget::none())
        .build()
        .unwrap();

    assert!(matches!(options.store, StoreSettings::Connection(ref c) if *c == connection));
    assert_eq!(options.script_source, ScriptSource::embedded());
    assert_eq!(options.retry_budget, RetryBudget::none());
}
