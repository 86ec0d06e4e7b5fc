use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use fruit_sense::SensorConfig;
use tempfile::NamedTempFile;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FRUIT_CONFIG",
        "SERIAL_PORT",
        "BAUD_RATE",
        "CSV_FILE",
        "MODEL_PATH",
        "SCALER_PATH",
        "POLL_TIMEOUT_MS",
        "LABEL_KEYS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SensorConfig::load().expect("default config");
    assert_eq!(cfg.serial.path, "/dev/ttyUSB0");
    assert_eq!(cfg.serial.baud_rate, 115_200);
    assert_eq!(cfg.serial.poll_timeout, Duration::from_millis(100));
    assert_eq!(cfg.dataset_path, PathBuf::from("datos_colores.csv"));
    assert_eq!(cfg.label_keys.label_for('l'), Some("limon"));
}

#[test]
fn file_values_then_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "serial": {
            "port": "/dev/ttyACM0",
            "baud_rate": 9600,
            "poll_timeout_ms": 50
        },
        "dataset_path": "muestras.csv",
        "model": {
            "model_path": "modelo.json",
            "scaler_path": "escala.json"
        },
        "label_keys": "k=kiwi,n=naranja"
    }"#;
    file.write_all(json.as_bytes()).expect("write config");
    std::env::set_var("FRUIT_CONFIG", file.path());

    let cfg = SensorConfig::load().expect("file config");
    assert_eq!(cfg.serial.path, "/dev/ttyACM0");
    assert_eq!(cfg.serial.baud_rate, 9600);
    assert_eq!(cfg.serial.poll_timeout, Duration::from_millis(50));
    assert_eq!(cfg.dataset_path, PathBuf::from("muestras.csv"));
    assert_eq!(cfg.model_path, PathBuf::from("modelo.json"));
    assert_eq!(cfg.scaler_path, PathBuf::from("escala.json"));
    assert_eq!(cfg.label_keys.label_for('k'), Some("kiwi"));
    assert_eq!(cfg.label_keys.label_for('l'), None);

    std::env::set_var("SERIAL_PORT", "stub://limon");
    std::env::set_var("BAUD_RATE", "57600");
    std::env::set_var("CSV_FILE", "otro.csv");
    std::env::set_var("LABEL_KEYS", "u=uva");
    let cfg = SensorConfig::load().expect("env overrides");
    assert_eq!(cfg.serial.path, "stub://limon");
    assert_eq!(cfg.serial.baud_rate, 57_600);
    assert_eq!(cfg.serial.poll_timeout, Duration::from_millis(50));
    assert_eq!(cfg.dataset_path, PathBuf::from("otro.csv"));
    assert_eq!(cfg.label_keys.entries().len(), 1);
    assert_eq!(cfg.label_keys.label_for('u'), Some("uva"));

    clear_env();
}

#[test]
fn rejects_out_of_range_poll_timeout() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for value in ["0", "1000"] {
        std::env::set_var("POLL_TIMEOUT_MS", value);
        let err = SensorConfig::load().expect_err("timeout should be rejected");
        assert!(err.to_string().contains("poll timeout"), "{}", err);
    }
    std::env::set_var("POLL_TIMEOUT_MS", "soon");
    assert!(SensorConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BAUD_RATE", "fast");
    assert!(SensorConfig::load().is_err());
    std::env::remove_var("BAUD_RATE");

    std::env::set_var("BAUD_RATE", "0");
    assert!(SensorConfig::load().is_err());
    std::env::remove_var("BAUD_RATE");

    std::env::set_var("LABEL_KEYS", "l=Limon");
    assert!(SensorConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_or_malformed_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("FRUIT_CONFIG", dir.path().join("absent.json"));
    let err = SensorConfig::load().expect_err("missing file");
    assert!(err.to_string().contains("failed to read config file"));

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    std::env::set_var("FRUIT_CONFIG", file.path());
    let err = SensorConfig::load().expect_err("malformed file");
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
