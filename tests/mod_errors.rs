use centralcache::{CacheError, ErrorKind};
use std::time::Duration;

#[test]
fn errors_group_into_three_kinds() {
    let configuration = [
        CacheError::DuplicateCache("a".into()),
        CacheError::InvalidConfig("x".into()),
        CacheError::RegistryClosed,
        CacheError::CacheShutdown("a".into()),
        CacheError::NoSuchCache("a".into()),
        CacheError::TypeMismatch("a".into()),
        CacheError::ConfigFile("bad".into()),
    ];
    let storage = [
        CacheError::Io("disk".into()),
        CacheError::Encode("e".into()),
        CacheError::Decode("d".into()),
        CacheError::CorruptRecord("c".into()),
    ];
    let computation = [CacheError::Computation("boom".into()), CacheError::WaitTimedOut(Duration::from_secs(1))];

    assert!(configuration.iter().all(|e| e.kind() == ErrorKind::Configuration));
    assert!(storage.iter().all(|e| e.kind() == ErrorKind::Storage && e.is_storage()));
    assert!(computation.iter().all(|e| e.kind() == ErrorKind::Computation));
}

#[test]
fn io_errors_convert_to_storage() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume");
    let err: CacheError = io.into();
    assert!(err.is_storage());
    assert!(err.to_string().contains("read-only volume"));
}

#[test]
fn messages_name_the_subject() {
    assert_eq!(CacheError::DuplicateCache("jimcache".into()).to_string(), "Cache already exists: jimcache");
    assert_eq!(CacheError::RegistryClosed.to_string(), "Registry is closed");
    assert_eq!(CacheError::Computation("backend down".into()).to_string(), "Computation failed: backend down");
}

#[test]
fn toml_errors_are_config_file_errors() {
    let parse: Result<centralcache::RegistryConfig, toml::de::Error> = toml::from_str("disk_root = [");
    let err: CacheError = parse.unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, CacheError::ConfigFile(_)));
}
