use kiosk_overlay::settings::OverlaySettings;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let settings = OverlaySettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings, OverlaySettings::default());
    assert_eq!(settings.server.port, 8765);
    assert_eq!(settings.server.bind_address, "0.0.0.0");
    assert_eq!(settings.server.stop_endpoint, "/overlay/stop");
    assert_eq!(settings.server.info_endpoint, "/overlay/info-card");
    assert!(settings.theme.show_notification_bar);
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"clocks": "Asia/Tokyo=Tokyo", "server": {"port": 9000}, "theme": {"accent": "red"}}"#,
    )
    .unwrap();

    let settings = OverlaySettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings.server.port, 9000);
    assert_eq!(settings.server.allowed_origins, vec!["*".to_string()]);
    assert!(settings.server.clock_24h);
    assert_eq!(settings.theme.accent, "red");
    assert_eq!(settings.max_clocks, 4);

    let clocks = settings.clock_configs();
    let labels: Vec<_> = clocks.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["Local", "Tokyo"]);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(OverlaySettings::load(path.to_str().unwrap()).is_err());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let mut settings = OverlaySettings::default();
    settings.debug_logging = true;
    settings.log_file = Some("overlay.log".into());
    settings.local_clock_label = "Kitchen".into();
    settings.server.allowed_origins = vec!["http://kiosk.local".into()];
    settings.save(path.to_str().unwrap()).unwrap();

    let loaded = OverlaySettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded, settings);
    assert_eq!(loaded.log_file_path(), Some(PathBuf::from("overlay.log")));
    assert_eq!(loaded.clock_configs()[0].label, "Kitchen");
}

#[test]
fn blank_log_file_means_no_file() {
    let settings = OverlaySettings {
        log_file: Some("   ".into()),
        ..OverlaySettings::default()
    };
    assert_eq!(settings.log_file_path(), None);
}
