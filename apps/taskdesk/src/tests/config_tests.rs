use super::{load_settings_from, normalize_server_url, Settings};

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

fn no_env(_: &str) -> Option<String> {
    None
}

fn temp_config(contents: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("taskdesk_config_test_{suffix}.toml"));
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn missing_file_yields_defaults() {
    let settings = load_settings_from(Path::new("/nonexistent/taskdesk.toml"), no_env);
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.redirect_limit, 8);
}

#[test]
fn file_values_override_defaults() {
    let path = temp_config(
        r#"
server_url = "https://tasks.example.com"
request_timeout_secs = 5
auth_file = "/tmp/session.json"
"#,
    );

    let settings = load_settings_from(&path, no_env);

    assert_eq!(settings.server_url, "https://tasks.example.com");
    assert_eq!(settings.request_timeout_secs, 5);
    assert_eq!(settings.auth_file, PathBuf::from("/tmp/session.json"));
    assert_eq!(settings.log_filter, "info");
    fs::remove_file(path).expect("cleanup");
}

#[test]
fn environment_wins_over_file_and_app_prefix_wins_last() {
    let path = temp_config("server_url = \"http://file:8090\"\nredirect_limit = 3\n");
    let env: HashMap<&str, &str> = HashMap::from([
        ("TASKDESK_SERVER_URL", "http://legacy:8090"),
        ("APP__SERVER_URL", "http://prefixed:8090"),
        ("APP__REDIRECT_LIMIT", "not-a-number"),
        ("APP__LOG_FILTER", "debug,client_core=trace"),
    ]);

    let settings = load_settings_from(&path, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.server_url, "http://prefixed:8090");
    assert_eq!(settings.redirect_limit, 3);
    assert_eq!(settings.log_filter, "debug,client_core=trace");
    fs::remove_file(path).expect("cleanup");
}

#[test]
fn malformed_file_is_ignored() {
    let path = temp_config("server_url = [not toml");
    let settings = load_settings_from(&path, no_env);
    assert_eq!(settings, Settings::default());
    fs::remove_file(path).expect("cleanup");
}

#[test]
fn server_url_is_normalized() {
    assert_eq!(
        normalize_server_url(" 127.0.0.1:8090/ ").expect("url"),
        "http://127.0.0.1:8090"
    );
    assert_eq!(
        normalize_server_url("https://tasks.example.com/pb/").expect("url"),
        "https://tasks.example.com/pb"
    );
    assert!(normalize_server_url("   ").is_err());
    assert!(normalize_server_url("ftp://tasks.example.com").is_err());
}
