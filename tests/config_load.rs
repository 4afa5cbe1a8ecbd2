use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use motion_fusion::config::{FusionConfig, CONFIG_ENV};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        CONFIG_ENV,
        "FUSION_MODEL",
        "FUSION_SOURCE",
        "FUSION_SNAPSHOT_DIR",
        "FUSION_STATUS_ADDR",
        "FUSION_CONF_THRESHOLD",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        model = "models/yolov8s.onnx"
        conf_threshold = 0.5
        iou_threshold = 0.6
        motion_history = 7
        motion_area_threshold = 800

        [capture]
        source = "stub://static"
        width = 320
        height = 240
        fps = 15

        [snapshot]
        dir = "shots"

        [status]
        addr = "127.0.0.1:9100"

        [display]
        preview_path = "preview.png"
        "#,
    );

    std::env::set_var(CONFIG_ENV, file.path());
    std::env::set_var("FUSION_MODEL", "stub");
    std::env::set_var("FUSION_CONF_THRESHOLD", "0.25");

    let cfg = FusionConfig::load().expect("load config");

    assert_eq!(cfg.model, "stub");
    assert_eq!(cfg.conf_threshold, 0.25);
    assert_eq!(cfg.iou_threshold, 0.6);
    assert_eq!(cfg.motion_history, 7);
    assert_eq!(cfg.motion_area_threshold, 800.0);
    assert_eq!(cfg.capture.source, "stub://static");
    assert_eq!(cfg.capture_config().width, 320);
    assert_eq!(cfg.capture_config().height, 240);
    assert_eq!(cfg.capture_config().target_fps, 15);
    assert_eq!(cfg.snapshot_dir, PathBuf::from("shots"));
    assert_eq!(cfg.status_addr, "127.0.0.1:9100");
    assert_eq!(cfg.preview_path, Some(PathBuf::from("preview.png")));

    clear_env();
}

#[test]
fn missing_file_uses_defaults_and_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FUSION_SOURCE", "stub://moving?frames=3");
    std::env::set_var("FUSION_SNAPSHOT_DIR", "/tmp/fusion-shots");
    std::env::set_var("FUSION_STATUS_ADDR", "127.0.0.1:0");

    let cfg = FusionConfig::load().expect("load config");
    assert_eq!(cfg.model, "yolov8n.onnx");
    assert_eq!(cfg.conf_threshold, 0.35);
    assert_eq!(cfg.capture.source, "stub://moving?frames=3");
    assert_eq!(cfg.snapshot_dir, PathBuf::from("/tmp/fusion-shots"));
    assert_eq!(cfg.status_addr, "127.0.0.1:0");

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("conf_threshold = 1.5\n");
    let err = FusionConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("conf_threshold"));

    let file = write_config("[motion]\nkernel_size = 4\n");
    assert!(FusionConfig::load_from(Some(file.path())).is_err());

    let file = write_config("unknown_key = true\n");
    assert!(FusionConfig::load_from(Some(file.path())).is_err());

    std::env::set_var("FUSION_CONF_THRESHOLD", "high");
    assert!(FusionConfig::load_from(None).is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("tempdir");
    let err = FusionConfig::load_from(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
