use serial_dispatch::config::{CompletionMode, Config, DispatcherConfig};
use serial_dispatch::error::Error;

#[test]
fn defaults_are_fire_and_forget() {
    let config = DispatcherConfig::default();
    assert_eq!(config.name, "dispatcher");
    assert_eq!(config.completion, CompletionMode::FireAndForget);
}

#[test]
fn toml_overrides_defaults() {
    let config = DispatcherConfig::from_toml_str(
        r#"
        name = "mailer"
        completion = "await_completion"
        "#,
    )
    .unwrap();
    assert_eq!(config.name, "mailer");
    assert_eq!(config.completion, CompletionMode::AwaitCompletion);

    let partial = DispatcherConfig::from_toml_str(r#"name = "indexer""#).unwrap();
    assert_eq!(partial.completion, CompletionMode::FireAndForget);
}

#[test]
fn toml_rejects_unknown_keys_and_modes() {
    let err = DispatcherConfig::from_toml_str(r#"workers = 4"#).unwrap_err();
    assert!(matches!(err, Error::ConfigFile(_)));

    let err = DispatcherConfig::from_toml_str(r#"completion = "eventually""#).unwrap_err();
    assert!(matches!(err, Error::ConfigFile(_)));
}

#[test]
fn empty_name_is_rejected() {
    let err = DispatcherConfig::from_toml_str(r#"name = "  ""#).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn from_file_reads_toml() {
    let path = std::env::temp_dir().join(format!("serial-dispatch-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "name = \"from-disk\"\n").unwrap();

    let config = DispatcherConfig::from_file(&path).unwrap();
    assert_eq!(config.name, "from-disk");

    std::fs::remove_file(&path).unwrap();
    assert!(matches!(
        DispatcherConfig::from_file(&path),
        Err(Error::Io(_))
    ));
}

#[test]
fn completion_mode_parses_and_displays() {
    for mode in [CompletionMode::FireAndForget, CompletionMode::AwaitCompletion] {
        assert_eq!(mode.to_string().parse::<CompletionMode>().unwrap(), mode);
    }
    assert!("sometimes".parse::<CompletionMode>().is_err());
}

// Environment variables are process-global, so every env case runs in this
// one test to keep them from interleaving.
#[test]
fn config_from_env() {
    unsafe {
        std::env::remove_var("DISPATCHER_NAME");
        std::env::remove_var("DISPATCHER_COMPLETION");
        std::env::remove_var("OTEL_ENDPOINT");
        std::env::remove_var("LOG_LEVEL");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.dispatcher, DispatcherConfig::default());
    assert!(config.otel_endpoint.is_none());
    assert_eq!(config.log_level, "info");

    unsafe {
        std::env::set_var("DISPATCHER_NAME", "env-dispatcher");
        std::env::set_var("DISPATCHER_COMPLETION", "await_completion");
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
        std::env::set_var("LOG_LEVEL", "debug");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.dispatcher.name, "env-dispatcher");
    assert_eq!(
        config.dispatcher.completion,
        CompletionMode::AwaitCompletion
    );
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "debug");

    unsafe {
        std::env::set_var("DISPATCHER_COMPLETION", "whenever");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::remove_var("DISPATCHER_NAME");
        std::env::remove_var("DISPATCHER_COMPLETION");
        std::env::remove_var("OTEL_ENDPOINT");
        std::env::remove_var("LOG_LEVEL");
    }
}
