use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::registry::decode_string_set;
use crate::registry::parse_worker_id;
use crate::registry::OnlineNodeValue;
use crate::ComputeNodeEvent;
use crate::ComputeNodePath;
use crate::DataChangedEvent;
use crate::DataChangedType;
use crate::DispatchEvent;
use crate::DispatchEventBuilder;
use crate::InstanceMetaData;
use crate::MALFORMED_CONTENT_METRIC;

/// Online, offline, labels, status and worker id changes of compute nodes
#[derive(Debug, Clone)]
pub struct ComputeNodeStateChangedBuilder {
    paths: Arc<ComputeNodePath>,
}

impl ComputeNodeStateChangedBuilder {
    pub fn new(paths: Arc<ComputeNodePath>) -> Self {
        Self { paths }
    }

    pub fn decode(
        &self,
        event: &DataChangedEvent,
    ) -> Option<ComputeNodeEvent> {
        let written = match event.event_type {
            DataChangedType::Added | DataChangedType::Updated => true,
            DataChangedType::Deleted => false,
            DataChangedType::Ignored => return None,
        };

        if let Some((instance_type, instance_id)) = self.paths.find_online_instance(&event.key) {
            if !written {
                return Some(ComputeNodeEvent::Offline {
                    instance_type,
                    instance_id,
                });
            }
            let value = serde_json::from_str::<OnlineNodeValue>(event.value_str()).unwrap_or_else(|e| {
                warn!(instance_id = %instance_id, "Malformed online node value: {:?}", e);
                MALFORMED_CONTENT_METRIC.with_label_values(&["online"]).inc();
                OnlineNodeValue::default()
            });
            return Some(ComputeNodeEvent::Online(InstanceMetaData::new(
                instance_id,
                instance_type,
                value.attributes,
                value.version,
            )));
        }

        if let Some(instance_id) = self.paths.find_labels_instance(&event.key) {
            let labels = self.string_set(event, written, &instance_id, "labels");
            return Some(ComputeNodeEvent::LabelsChanged { instance_id, labels });
        }

        if let Some(instance_id) = self.paths.find_status_instance(&event.key) {
            let status = self.string_set(event, written, &instance_id, "status");
            return Some(ComputeNodeEvent::StatusChanged { instance_id, status });
        }

        let instance_id = self.paths.find_worker_id_instance(&event.key)?;
        let worker_id = if written {
            parse_worker_id(&instance_id, event.value_str())
        } else {
            None
        };
        Some(ComputeNodeEvent::WorkerIdChanged {
            instance_id,
            worker_id,
        })
    }

    fn string_set(
        &self,
        event: &DataChangedEvent,
        written: bool,
        instance_id: &str,
        node: &'static str,
    ) -> BTreeSet<String> {
        if written {
            decode_string_set(event.value.clone(), instance_id, node)
        } else {
            BTreeSet::new()
        }
    }
}

impl DispatchEventBuilder for ComputeNodeStateChangedBuilder {
    fn subscribed_keys(&self) -> Vec<String> {
        vec![self.paths.root().to_string()]
    }

    fn build(
        &self,
        event: &DataChangedEvent,
    ) -> Option<DispatchEvent> {
        self.decode(event).map(DispatchEvent::ComputeNode)
    }
}
