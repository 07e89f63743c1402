use super::*;

#[test]
fn test_sub_paths() {
    let path = VersionNodePath::new("/rules/sharding/t_order");

    assert_eq!(path.versions_path(), "/rules/sharding/t_order/versions");
    assert_eq!(path.version_path(3), "/rules/sharding/t_order/versions/3");
    assert_eq!(path.active_version_path(), "/rules/sharding/t_order/active_version");
}

#[test]
fn test_find_version() {
    let path = VersionNodePath::new("/rules/authority");

    assert_eq!(path.find_version("/rules/authority/versions/0"), Some(0));
    assert_eq!(path.find_version("/rules/authority/versions/42"), Some(42));
    assert_eq!(path.find_version(&path.version_path(7)), Some(7));

    assert_eq!(path.find_version("/rules/authority/versions"), None);
    assert_eq!(path.find_version("/rules/authority/versions/x1"), None);
    assert_eq!(path.find_version("/rules/authority/versions/-1"), None);
    assert_eq!(path.find_version("/rules/authority/versions/1/extra"), None);
    assert_eq!(path.find_version("/rules/authority_x/versions/1"), None);
    assert!(!path.is_version_path("/rules/authority/active_version"));
}

#[test]
fn test_is_active_version_path() {
    let path = VersionNodePath::new("/rules/authority");

    assert!(path.is_active_version_path("/rules/authority/active_version"));
    assert!(!path.is_active_version_path("/rules/authority/versions/0"));
    assert!(!path.is_active_version_path("/rules/authority"));
}
