use std::{env, fs, time::Duration};

use flowfin_server::DeploymentEnvironment;
use flowfin_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("flowfin.toml");

    let toml_content = r#"
environment = "production"

[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 2048

[logging]
level = "debug"

[security.csrf]
token_ttl = "30m"
sweep_interval = "1m"
cookie_name = "ff-csrf"
exempt_paths = ["/api/webhooks/"]

[security.headers.content_security_policy]
connect_src = ["'self'", "https://project.supabase.co"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.environment, DeploymentEnvironment::Production);
    assert!(cfg.is_production());
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.body_limit_bytes, 2048);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.security.csrf.token_ttl, Duration::from_secs(30 * 60));
    assert_eq!(cfg.security.csrf.sweep_interval, Duration::from_secs(60));
    assert_eq!(cfg.security.csrf.cookie_name, "ff-csrf");
    assert_eq!(cfg.security.csrf.header_name, "x-csrf-token");
    assert!(cfg.security.csrf.is_exempt("/api/webhooks/stripe"));
    assert_eq!(
        cfg.security.headers.content_security_policy.connect_src,
        vec!["'self'", "https://project.supabase.co"]
    );
    // Unlisted directives keep their defaults
    assert_eq!(
        cfg.security.headers.content_security_policy.frame_ancestors,
        vec!["'none'"]
    );

    // 2) Env override should win over file
    unsafe {
        env::set_var("FLOWFIN__SERVER__PORT", "9090");
        env::set_var("FLOWFIN__SECURITY__CSRF__TOKEN_TTL", "2h");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9090);
    assert_eq!(cfg_env.security.csrf.token_ttl, Duration::from_secs(2 * 3600));
    // cleanup env vars
    unsafe {
        env::remove_var("FLOWFIN__SERVER__PORT");
        env::remove_var("FLOWFIN__SECURITY__CSRF__TOKEN_TTL");
    }

    // 3) Invalid config (token too short) should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[security.csrf]
token_bytes = 8
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("token_bytes must be >="));

    // 4) Missing file falls back to defaults
    let missing = dir.path().join("absent.toml");
    let cfg_default = load_config(missing.to_str()).expect("defaults");
    assert_eq!(cfg_default.environment, DeploymentEnvironment::Development);
    assert_eq!(cfg_default.security.csrf.token_ttl, Duration::from_secs(3600));
}
