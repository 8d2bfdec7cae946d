use super::{apply_env, apply_file, normalize_database_url, Settings};

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_empty_urls_sensible() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("  "),
        Settings::default().database_url
    );
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
}

#[test]
fn converts_sqlite_double_slash_windows_path() {
    assert_eq!(
        normalize_database_url("sqlite://C:/Users/alice/test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
bind_addr = "0.0.0.0:9000"
redis_url = "redis://cache:6379"
admin_token = "from-file"
"#,
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.redis_url.as_deref(), Some("redis://cache:6379"));
    assert_eq!(settings.admin_token, "from-file");
    assert_eq!(settings.database_url, Settings::default().database_url);
}

#[test]
fn malformed_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "bind_addr = [1, 2");
    assert_eq!(settings, Settings::default());
}

#[test]
fn prefixed_env_wins_over_short_names() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_of(&[
            ("ADMIN_TOKEN", "short"),
            ("APP__ADMIN_TOKEN", "prefixed"),
            ("DATABASE_URL", "sqlite::memory:"),
        ]),
    );
    assert_eq!(settings.admin_token, "prefixed");
    assert_eq!(settings.database_url, "sqlite::memory:");
}

#[test]
fn blank_redis_url_falls_back_to_memory_pointer() {
    let mut settings = Settings {
        redis_url: Some("redis://cache".into()),
        ..Settings::default()
    };
    apply_env(&mut settings, env_of(&[("REDIS_URL", "")]));
    assert_eq!(settings.redis_url, None);
}

#[tokio::test]
async fn normalized_database_url_creates_openable_sqlite_file() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("demo_night_server_open_test_{suffix}"));
    let db_path = temp_root.join("nested").join("server.db");

    let url = normalize_database_url(db_path.to_string_lossy().as_ref());
    let storage = storage::Storage::new(&url).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(temp_root).expect("cleanup");
}
