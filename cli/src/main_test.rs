use super::*;

#[test]
fn unique_channels_keeps_first_occurrence_order() {
    let channels = vec!["b".to_owned(), "a".to_owned(), "b".to_owned(), "c".to_owned(), "a".to_owned()];
    assert_eq!(unique_channels(channels), vec!["b", "a", "c"]);
}

#[test]
fn apply_overrides_replaces_origin_and_prefix() {
    let config = apply_overrides(
        PushConfig::default(),
        Some("https://push.example.com".to_owned()),
        Some("/events/".to_owned()),
    )
    .expect("config");
    assert_eq!(config.origin, "https://push.example.com");
    assert_eq!(config.path_prefix, "/events");
}

#[test]
fn apply_overrides_rejects_bad_origin() {
    let err = apply_overrides(PushConfig::default(), Some("push.example.com".to_owned()), None)
        .expect_err("origin without scheme");
    assert!(matches!(err, CliError::Config(pushsocket::PushError::InvalidOrigin(_))));
}

#[test]
fn apply_overrides_rejects_relative_prefix() {
    let err = apply_overrides(PushConfig::default(), None, Some("events".to_owned())).expect_err("relative prefix");
    assert!(matches!(err, CliError::Config(pushsocket::PushError::InvalidConfig { var: "PUSH_PATH_PREFIX", .. })));
}

#[test]
fn apply_overrides_accepts_root_prefix() {
    let config = apply_overrides(PushConfig::default(), None, Some("/".to_owned())).expect("config");
    assert_eq!(config.path_prefix, "");
}

#[test]
fn url_subcommand_parses_host_fragment() {
    let cli = Cli::try_parse_from(["push-cli", "--origin", "http://localhost:8080", "url", "news", "--host", ":9090"])
        .expect("parse");
    assert_eq!(cli.origin.as_deref(), Some("http://localhost:8080"));
    let Command::Url { channel, host } = cli.command else {
        panic!("expected url command");
    };
    assert_eq!(channel, "news");
    assert_eq!(host.as_deref(), Some(":9090"));
}

#[test]
fn subscribe_requires_a_channel() {
    assert!(Cli::try_parse_from(["push-cli", "subscribe"]).is_err());
}

#[test]
fn output_line_serializes_channel_and_data() {
    let data = serde_json::json!({ "price": 1.5 });
    let line = serde_json::to_string(&OutputLine { channel: "ticks", data: &data }).expect("serialize");
    assert_eq!(line, r#"{"channel":"ticks","data":{"price":1.5}}"#);
}

#[test]
fn budget_admits_exactly_the_limit() {
    let mut budget = MessageBudget::new(Some(2));
    assert!(budget.admit());
    assert!(!budget.is_spent());
    assert!(budget.admit());
    assert!(budget.is_spent());
    // Frames queued behind the limit are refused and not counted.
    assert!(!budget.admit());
    assert!(!budget.admit());
    assert_eq!(budget.received, 2);
}

#[test]
fn zero_limit_is_spent_before_any_message() {
    let mut budget = MessageBudget::new(Some(0));
    assert!(budget.is_spent());
    assert!(!budget.admit());
    assert_eq!(budget.received, 0);
}

#[test]
fn unlimited_budget_never_spends() {
    let mut budget = MessageBudget::new(None);
    for _ in 0..1000 {
        assert!(budget.admit());
    }
    assert!(!budget.is_spent());
    assert_eq!(budget.received, 1000);
}
