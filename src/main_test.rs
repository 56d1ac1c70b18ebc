use super::*;

// Single test so parallel test threads never race on the env vars
#[test]
fn test_env_configuration() {
    std::env::remove_var("CHART_OPERATOR_HEALTH_PORT");
    std::env::remove_var("CHART_OPERATOR_HELM_BIN");
    std::env::remove_var("CHART_OPERATOR_CALL_TIMEOUT_SECS");
    std::env::remove_var("CHART_OPERATOR_RESYNC_SECS");
    std::env::remove_var("CHART_OPERATOR_WATCH_NAMESPACE");

    // Defaults apply without overrides
    assert_eq!(health_port(), 8080);
    assert_eq!(helm_bin(), "helm");
    assert_eq!(call_timeout(), Duration::from_secs(30));
    assert_eq!(resync_interval(), Duration::from_secs(300));
    assert_eq!(watch_namespace(), None);

    // Overrides are picked up
    std::env::set_var("CHART_OPERATOR_HELM_BIN", "/usr/local/bin/helm3");
    std::env::set_var("CHART_OPERATOR_RESYNC_SECS", "60");
    std::env::set_var("CHART_OPERATOR_WATCH_NAMESPACE", "platform-system");
    assert_eq!(helm_bin(), "/usr/local/bin/helm3");
    assert_eq!(resync_interval(), Duration::from_secs(60));
    assert_eq!(watch_namespace().as_deref(), Some("platform-system"));

    // An empty namespace means all namespaces
    std::env::set_var("CHART_OPERATOR_WATCH_NAMESPACE", "");
    assert_eq!(watch_namespace(), None);

    // Unparsable values fall back to defaults
    std::env::set_var("CHART_OPERATOR_CALL_TIMEOUT_SECS", "not-a-number");
    assert_eq!(call_timeout(), Duration::from_secs(30));

    std::env::remove_var("CHART_OPERATOR_HELM_BIN");
    std::env::remove_var("CHART_OPERATOR_CALL_TIMEOUT_SECS");
    std::env::remove_var("CHART_OPERATOR_RESYNC_SECS");
    std::env::remove_var("CHART_OPERATOR_WATCH_NAMESPACE");
}
