// ENC - Edit-and-Continue Engine
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use enc_common::env::ENC_CONFIG;
use enc_engine::{EngineConfig, LoggingConfig};
use serial_test::serial;
use tracing::info;

#[test]
fn test_default_config() {
    enc_common::logging::ensure_test_logging(None);
    info!("Running test");
    let config = EngineConfig::default();

    assert_eq!(config.reader_worker_name, "enc-symbol-reader");
    assert!(config.log_telemetry);
    assert!(config.stopped_at_exception_is_rude);
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_config_round_trips_through_toml() {
    enc_common::logging::ensure_test_logging(None);
    info!("Running test");
    let config = EngineConfig::default()
        .with_log_telemetry(false)
        .with_logging(LoggingConfig { component: "debugger".to_string(), file_logging: true });

    let text = toml::to_string(&config).unwrap();
    assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
#[serial]
fn test_default_path_honors_env_override() {
    enc_common::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("enc.toml");
    std::fs::write(&path, "stopped_at_exception_is_rude = false\n").unwrap();

    std::env::set_var(ENC_CONFIG, &path);
    let resolved = EngineConfig::default_path();
    let loaded = EngineConfig::load_default();
    std::env::remove_var(ENC_CONFIG);

    assert_eq!(resolved, Some(path));
    let loaded = loaded.unwrap();
    assert!(!loaded.stopped_at_exception_is_rude);
    assert!(loaded.log_telemetry);
}

#[test]
#[serial]
fn test_missing_default_file_falls_back_to_defaults() {
    enc_common::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();

    std::env::set_var(ENC_CONFIG, dir.path().join("absent.toml"));
    let loaded = EngineConfig::load_default();
    std::env::remove_var(ENC_CONFIG);

    assert_eq!(loaded.unwrap(), EngineConfig::default());
}
