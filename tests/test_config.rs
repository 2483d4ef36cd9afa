use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use quay::config::{CONFIG_ENV, Config, LISTEN_ENV};

// Tests in this file share the process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    unsafe {
        std::env::remove_var(LISTEN_ENV);
        std::env::remove_var(CONFIG_ENV);
    }
}

#[test]
fn test_config_default_address() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.server.workers, 8);
    assert_eq!(cfg.server.queue_capacity, 10_000);
    assert_eq!(cfg.server.max_connections, 65_535);
    assert_eq!(cfg.static_files.root, PathBuf::from("./public"));
    assert_eq!(cfg.static_files.index, "index.html");
}

#[test]
fn test_config_custom_address_from_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    unsafe {
        std::env::set_var(LISTEN_ENV, "0.0.0.0:3000");
    }

    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    clear_env();
}

#[test]
fn test_config_file_then_env_override() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "server:\n  listen_addr: \"127.0.0.1:9000\"\n  workers: 2\nstatic_files:\n  root: /srv/www"
    )
    .unwrap();

    unsafe {
        std::env::set_var(CONFIG_ENV, file.path());
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:9000");
    assert_eq!(cfg.server.workers, 2);
    assert_eq!(cfg.static_files.root, PathBuf::from("/srv/www"));

    unsafe {
        std::env::set_var(LISTEN_ENV, "127.0.0.1:9001");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:9001");
    assert_eq!(cfg.server.workers, 2);

    clear_env();
}

#[test]
fn test_config_missing_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    unsafe {
        std::env::set_var(CONFIG_ENV, "/nonexistent/quay.yaml");
    }

    let err = Config::load().unwrap_err();
    assert!(err.to_string().contains("/nonexistent/quay.yaml"));
    clear_env();
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let cfg = Config::from_yaml_str("server:\n  queue_capacity: 16\n").unwrap();
    assert_eq!(cfg.server.queue_capacity, 16);
    assert_eq!(cfg.server.workers, 8);
    assert_eq!(cfg.static_files.index, "index.html");
}

#[test]
fn test_validate_rejects_zero_limits() {
    let mut cfg = Config::default();
    cfg.server.workers = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.server.queue_capacity = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.static_files.index.clear();
    assert!(cfg.validate().is_err());

    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_invalid_yaml_is_rejected() {
    assert!(Config::from_yaml_str("server: [not, a, map]").is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.server.listen_addr, cfg2.server.listen_addr);
}
