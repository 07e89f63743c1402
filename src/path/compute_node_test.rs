use super::*;
use crate::InstanceType;

fn paths() -> ComputeNodePath {
    ComputeNodePath::new("/nodes/compute_nodes", "/reservation/worker_id").unwrap()
}

#[test]
fn test_paths_follow_layout() {
    let paths = paths();

    assert_eq!(
        paths.online_path(InstanceType::Proxy, "127.0.0.1:3307"),
        "/nodes/compute_nodes/proxy/online/127.0.0.1:3307"
    );
    assert_eq!(
        paths.online_root(InstanceType::Jdbc),
        "/nodes/compute_nodes/jdbc/online"
    );
    assert_eq!(paths.labels_path("p1"), "/nodes/compute_nodes/labels/p1");
    assert_eq!(paths.status_path("p1"), "/nodes/compute_nodes/status/p1");
    assert_eq!(paths.worker_id_path("p1"), "/nodes/compute_nodes/worker-id/p1");
    assert_eq!(paths.worker_id_reservation_path(7), "/reservation/worker_id/7");
}

#[test]
fn test_find_online_instance() {
    let paths = paths();

    assert_eq!(
        paths.find_online_instance(&paths.online_path(InstanceType::Jdbc, "app-1")),
        Some((InstanceType::Jdbc, "app-1".to_string()))
    );
    assert_eq!(
        paths.find_online_instance("/nodes/compute_nodes/unknown/online/app-1"),
        None
    );
    assert_eq!(paths.find_online_instance("/nodes/compute_nodes/proxy/online"), None);
}

#[test]
fn test_find_member_children() {
    let paths = paths();

    assert_eq!(
        paths.find_labels_instance(&paths.labels_path("p-1")),
        Some("p-1".to_string())
    );
    assert_eq!(
        paths.find_status_instance(&paths.status_path("p-1")),
        Some("p-1".to_string())
    );
    assert_eq!(
        paths.find_worker_id_instance(&paths.worker_id_path("p-1")),
        Some("p-1".to_string())
    );

    assert_eq!(paths.find_labels_instance(&paths.status_path("p-1")), None);
    assert_eq!(paths.find_worker_id_instance("/nodes/compute_nodes/worker-id"), None);
}
