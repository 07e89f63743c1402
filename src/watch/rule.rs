use std::sync::Arc;

use tracing::warn;

use crate::DataChangedEvent;
use crate::DataChangedType;
use crate::DispatchEvent;
use crate::DispatchEventBuilder;
use crate::RuleItemEvent;
use crate::RuleItemPathShape;
use crate::RuleNodePath;
use crate::MALFORMED_CONTENT_METRIC;

/// Rule item changes: the active version pointer moving, or the item going
/// away.
///
/// The bare item key may be an implicit parent the store never reports, so a
/// drop is recognised by its `active_version` pointer being deleted. Writes
/// of `versions/<n>` are not events: consumers react to the pointer only.
#[derive(Debug, Clone)]
pub struct RuleItemChangedBuilder {
    paths: Arc<RuleNodePath>,
}

impl RuleItemChangedBuilder {
    pub fn new(paths: Arc<RuleNodePath>) -> Self {
        Self { paths }
    }

    pub fn decode(
        &self,
        event: &DataChangedEvent,
    ) -> Option<RuleItemEvent> {
        let item = self.paths.find_rule_item(&event.key)?;
        if item.shape != RuleItemPathShape::ActiveVersion {
            return None;
        }

        match event.event_type {
            DataChangedType::Added | DataChangedType::Updated => {
                let version = match event.value_str().trim().parse::<u64>() {
                    Ok(version) => version,
                    Err(e) => {
                        warn!(key = %event.key, value = event.value_str(), "Malformed active version ignored: {:?}", e);
                        MALFORMED_CONTENT_METRIC
                            .with_label_values(&["active_version"])
                            .inc();
                        return None;
                    }
                };
                Some(RuleItemEvent::RuleItemAltered {
                    item_type: item.item_type,
                    name: item.name,
                    version,
                })
            }
            DataChangedType::Deleted => Some(RuleItemEvent::RuleItemDropped {
                item_type: item.item_type,
                name: item.name,
            }),
            DataChangedType::Ignored => None,
        }
    }
}

impl DispatchEventBuilder for RuleItemChangedBuilder {
    fn subscribed_keys(&self) -> Vec<String> {
        let root = self.paths.root().trim_end_matches('/');
        if root.is_empty() {
            vec!["/".to_string()]
        } else {
            vec![root.to_string()]
        }
    }

    fn build(
        &self,
        event: &DataChangedEvent,
    ) -> Option<DispatchEvent> {
        self.decode(event).map(DispatchEvent::RuleItem)
    }
}
