use std::io::Write;

use livelist::config::{Settings, StorageKind, DEFAULT_TIME_FORMAT};
use livelist::persist::PersistenceMode;

fn settings_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn file_values_override_the_defaults() {
    let file = settings_file(
        r#"
        [database]
        mode = "file"
        path = "laps.db"

        [screen]
        time_format = "%H:%M"
        "#,
    );
    let settings = Settings::load(file.path().to_str()).unwrap();
    assert_eq!(settings.database.mode, StorageKind::File);
    assert_eq!(settings.persistence_mode(), PersistenceMode::File("laps.db".to_owned()));
    assert_eq!(settings.screen.time_format, "%H:%M");
    // not named in the file
    assert_eq!(settings.log.filter, "info");
}

#[test]
fn an_empty_file_gives_the_defaults() {
    let file = settings_file("");
    let settings = Settings::load(file.path().to_str()).unwrap();
    assert_eq!(settings.persistence_mode(), PersistenceMode::InMemory);
    assert_eq!(settings.screen.time_format, DEFAULT_TIME_FORMAT);
}

#[test]
fn unknown_storage_kind_is_a_config_error() {
    let file = settings_file("[database]\nmode = \"cloud\"\n");
    assert!(matches!(
        Settings::load(file.path().to_str()),
        Err(livelist::LivelistError::Config(_))
    ));
}

#[test]
fn a_missing_named_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nowhere.toml");
    assert!(Settings::load(missing.to_str()).is_err());
}
