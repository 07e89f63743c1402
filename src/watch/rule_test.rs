use std::sync::Arc;

use super::*;
use crate::DataChangedEvent;
use crate::DataChangedType;
use crate::DispatchEventBuilder;
use crate::RuleItemEvent;
use crate::RuleNodePath;

fn builder() -> RuleItemChangedBuilder {
    RuleItemChangedBuilder::new(Arc::new(
        RuleNodePath::new("/rules/", &["tables"], &["default_strategy"]).unwrap(),
    ))
}

fn event(
    key: &str,
    value: Option<&str>,
    event_type: DataChangedType,
) -> DataChangedEvent {
    DataChangedEvent::new(key, value.map(str::to_string), event_type)
}

#[test]
fn test_active_version_change_is_altered() {
    let b = builder();

    assert_eq!(
        b.decode(&event(
            "/rules/tables/t_order/active_version",
            Some("3"),
            DataChangedType::Updated
        )),
        Some(RuleItemEvent::RuleItemAltered {
            item_type: "tables".to_string(),
            name: Some("t_order".to_string()),
            version: 3,
        })
    );
    assert_eq!(
        b.decode(&event(
            "/rules/default_strategy/active_version",
            Some("0"),
            DataChangedType::Added
        )),
        Some(RuleItemEvent::RuleItemAltered {
            item_type: "default_strategy".to_string(),
            name: None,
            version: 0,
        })
    );
}

#[test]
fn test_pointer_deletion_is_dropped() {
    assert_eq!(
        builder().decode(&event(
            "/rules/tables/t_order/active_version",
            None,
            DataChangedType::Deleted
        )),
        Some(RuleItemEvent::RuleItemDropped {
            item_type: "tables".to_string(),
            name: Some("t_order".to_string()),
        })
    );
}

#[test]
fn test_version_writes_and_unknown_keys_are_not_events() {
    let b = builder();

    assert_eq!(
        b.decode(&event("/rules/tables/t_order/versions/3", Some("{}"), DataChangedType::Added)),
        None
    );
    assert_eq!(
        b.decode(&event("/rules/views/v1/active_version", Some("1"), DataChangedType::Added)),
        None
    );
    assert_eq!(
        b.decode(&event("/rules/tables/t_order/active_version", Some("x"), DataChangedType::Updated)),
        None
    );
}

#[test]
fn test_watch_key_has_no_trailing_separator() {
    assert_eq!(builder().subscribed_keys(), vec!["/rules".to_string()]);
}
