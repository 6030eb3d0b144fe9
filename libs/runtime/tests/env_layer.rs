//! Environment overrides for the layered config. Kept in its own test binary
//! so the process-wide variables never leak into the unit tests.

use runtime::AppConfig;

#[test]
fn chat_prefixed_env_overrides_yaml() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg_path = tmp.path().join("cfg.yaml");
    let home = tmp.path().join("home").to_string_lossy().replace('\\', "/");
    std::fs::write(
        &cfg_path,
        format!(
            "home_dir: \"{home}\"\n\
             database:\n  url: \"sqlite://from-yaml.db\"\n  max_conns: 4\n"
        ),
    )
    .unwrap();

    std::env::set_var("CHAT__DATABASE__URL", "postgres://env@localhost/chat");
    std::env::set_var("APP__DATABASE__MAX_CONNS", "99");
    let config = AppConfig::load_layered(&cfg_path);
    std::env::remove_var("CHAT__DATABASE__URL");
    std::env::remove_var("APP__DATABASE__MAX_CONNS");

    let db = config.unwrap().database.unwrap();
    assert_eq!(db.url, "postgres://env@localhost/chat");
    // only the CHAT__ prefix is read
    assert_eq!(db.max_conns, Some(4));
}
