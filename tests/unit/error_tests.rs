use metagraph_monitor::AppError;

fn all_variants(msg: &str) -> Vec<AppError> {
    vec![
        AppError::Config(msg.into()),
        AppError::Remote(msg.into()),
        AppError::Http(msg.into()),
        AppError::Reference(msg.into()),
        AppError::Snapshot(msg.into()),
        AppError::ConvergenceTimeout(msg.into()),
        AppError::BringUp(msg.into()),
        AppError::Slack(msg.into()),
        AppError::Ipc(msg.into()),
        AppError::NotFound(msg.into()),
    ]
}

#[test]
fn display_prefixes() {
    let prefixes: Vec<String> = all_variants("boom")
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        prefixes,
        vec![
            "config: boom",
            "remote: boom",
            "http: boom",
            "reference: boom",
            "snapshot: boom",
            "convergence timeout: boom",
            "bring-up: boom",
            "slack: boom",
            "ipc: boom",
            "not found: boom",
        ]
    );
}

#[test]
fn messages_have_no_trailing_period() {
    for err in all_variants("node 10.0.0.1 did not answer") {
        let s = err.to_string();
        assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
    }
}

#[test]
fn toml_errors_become_config_errors() {
    let parse_err = toml::from_str::<toml::Table>("= nope").unwrap_err();
    let err = AppError::from(parse_err);
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn json_errors_become_http_errors() {
    let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = AppError::from(parse_err);
    assert!(matches!(err, AppError::Http(_)));
    assert!(err.to_string().starts_with("http: invalid json:"));
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Remote("exit 1".into()));
    assert_eq!(err.to_string(), "remote: exit 1");
}
