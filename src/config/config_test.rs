use std::time::Duration;

use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_configserv_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("CONFIGSERV__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let settings = Settings::default();

    assert_eq!(settings.server.listen_address.port(), 5672);
    assert_eq!(settings.subscription.link_buffer_size, 16);
    assert_eq!(settings.retry.relist.base_delay_ms, 100);
    assert!(!settings.tls.enable_tls);
    assert!(!settings.monitoring.prometheus_enabled);
    assert_eq!(
        settings.domains,
        vec![
            DomainBinding::new("v1/addresses", "address-config"),
            DomainBinding::new("podsense", "pod-topology"),
        ]
    );
    assert!(settings.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_configserv_env_vars();
    with_vars(
        vec![
            ("CONFIGSERV__SERVER__LISTEN_ADDRESS", Some("0.0.0.0:6000")),
            ("CONFIGSERV__SUBSCRIPTION__IDLE_ENTRY_TIMEOUT_MS", Some("2500")),
            ("CONFIGSERV__RETRY__RELIST__BASE_DELAY_MS", Some("50")),
        ],
        || {
            let settings = Settings::new().unwrap();

            assert_eq!(settings.server.listen_address.to_string(), "0.0.0.0:6000");
            assert_eq!(
                settings.subscription.idle_entry_timeout(),
                Some(Duration::from_millis(2500))
            );
            assert_eq!(settings.retry.relist.base_delay_ms, 50);
            assert_eq!(settings.retry.relist.max_delay_ms, 30_000);
            assert_eq!(settings.domains.len(), 2);
        },
    );
}

#[test]
#[serial]
fn new_should_load_file_named_by_config_path() {
    cleanup_all_configserv_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("configserv.toml");
    std::fs::write(
        &config_path,
        r#"
        [subscription]
        link_buffer_size = 4

        [monitoring]
        prometheus_enabled = true
        prometheus_port = 9100
        "#,
    )
    .unwrap();

    with_vars(vec![("CONFIG_PATH", Some(config_path.to_str().unwrap()))], || {
        let settings = Settings::new().unwrap();

        assert_eq!(settings.subscription.link_buffer_size, 4);
        assert!(settings.monitoring.prometheus_enabled);
        assert_eq!(settings.monitoring.prometheus_port, 9100);
    });
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_configserv_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(
        &config_path,
        r#"
        [retry.relist]
        base_delay_ms = 250 # Override default value
        jitter_percent = 0

        [network]
        max_concurrent_streams = 64
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base = Settings::new().expect("success");
        let settings = base.with_override_config(config_path.to_str().unwrap()).unwrap();

        assert_eq!(settings.retry.relist.base_delay_ms, 250);
        assert_eq!(settings.retry.relist.jitter_percent, 0);
        assert_eq!(settings.retry.relist.max_delay_ms, 30_000);
        assert_eq!(settings.network.max_concurrent_streams, 64);
    });
}

#[test]
#[serial]
fn environment_should_win_over_override_file() {
    cleanup_all_configserv_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(&config_path, "[subscription]\nupdate_channel_size = 8\n").unwrap();

    with_vars(
        vec![("CONFIGSERV__SUBSCRIPTION__UPDATE_CHANNEL_SIZE", Some("32"))],
        || {
            let settings = Settings::default()
                .with_override_config(config_path.to_str().unwrap())
                .unwrap();
            assert_eq!(settings.subscription.update_channel_size, 32);
        },
    );
}

#[test]
fn validation_should_reject_bad_domain_bindings() {
    let mut settings = Settings::default();
    settings.domains.push(DomainBinding::new("podsense", "pod-topology"));
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.domains = vec![DomainBinding::new("v1/things", "no-such-plugin")];
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.domains.clear();
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.domains = vec![DomainBinding::new("  ", "pod-topology")];
    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_mtls_without_tls() {
    let mut settings = Settings::default();
    settings.tls.enable_mtls = true;
    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_missing_certificates() {
    let mut settings = Settings::default();
    settings.tls.enable_tls = true;
    settings.tls.server_certificate_path = "/nonexistent/server.pem".into();
    assert!(settings.clone().validate().is_err());

    // Generated material does not have to exist yet.
    settings.tls.generate_self_signed_certificates = true;
    assert!(settings.validate().is_ok());
}

#[test]
fn validation_should_reject_zero_buffers() {
    let mut settings = Settings::default();
    settings.subscription.link_buffer_size = 0;
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.subscription.update_channel_size = 0;
    assert!(settings.validate().is_err());
}

#[test]
fn validation_should_reject_inverted_backoff() {
    let mut settings = Settings::default();
    settings.retry.relist.base_delay_ms = 1000;
    settings.retry.relist.max_delay_ms = 10;
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.retry.relist.jitter_percent = 101;
    assert!(settings.validate().is_err());
}

#[test]
fn backoff_should_double_and_cap() {
    let policy = BackoffPolicy {
        base_delay_ms: 100,
        max_delay_ms: 1000,
        jitter_percent: 0,
    };

    assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    assert_eq!(policy.delay_for(1), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
    assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(1000));
    assert_eq!(policy.jittered_delay_for(2), Duration::from_millis(400));
}

#[test]
fn jittered_backoff_should_stay_within_spread() {
    let policy = BackoffPolicy {
        base_delay_ms: 1000,
        max_delay_ms: 10_000,
        jitter_percent: 20,
    };

    for _ in 0..100 {
        let delay = policy.jittered_delay_for(0);
        assert!(delay >= Duration::from_millis(800), "{delay:?}");
        assert!(delay <= Duration::from_millis(1200), "{delay:?}");
    }
}

#[test]
fn idle_timeout_zero_should_retain_entries() {
    let config = SubscriptionConfig::default();
    assert_eq!(config.idle_entry_timeout(), None);
}

#[test]
#[serial]
fn tcp_keepalive_should_follow_environment_override() {
    cleanup_all_configserv_env_vars();
    assert_eq!(
        Settings::default().network.tcp_keepalive(),
        Some(Duration::from_secs(300))
    );

    with_vars(vec![("CONFIGSERV__NETWORK__TCP_KEEPALIVE_IN_SECS", Some("42"))], || {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.network.tcp_keepalive(), Some(Duration::from_secs(42)));
    });

    with_vars(vec![("CONFIGSERV__NETWORK__TCP_KEEPALIVE_IN_SECS", Some("0"))], || {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.network.tcp_keepalive(), None);
    });
}
