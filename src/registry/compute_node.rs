use std::collections::BTreeSet;
use std::sync::Arc;

use autometrics::autometrics;
use tracing::debug;
use tracing::warn;

use super::OnlineNodeValue;
use crate::config::is_plain_identifier;
use crate::ClusterPersistRepository;
use crate::ComputeNodeInstance;
use crate::ComputeNodePath;
use crate::InstanceMetaData;
use crate::InstanceType;
use crate::RegistryError;
use crate::Result;
use crate::SerializationError;
use crate::API_SLO;
use crate::MALFORMED_CONTENT_METRIC;
use crate::ONLINE_INSTANCE_METRIC;

/// Reads and writes compute node membership.
///
/// Each process only ever writes its own nodes; everything else is read only.
#[derive(Clone)]
pub struct ComputeNodePersistService {
    repository: Arc<dyn ClusterPersistRepository>,
    paths: Arc<ComputeNodePath>,
}

impl std::fmt::Debug for ComputeNodePersistService {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ComputeNodePersistService")
            .field("root", &self.paths.root())
            .finish_non_exhaustive()
    }
}

impl ComputeNodePersistService {
    pub fn new(
        repository: Arc<dyn ClusterPersistRepository>,
        paths: Arc<ComputeNodePath>,
    ) -> Self {
        Self { repository, paths }
    }

    pub fn paths(&self) -> &ComputeNodePath {
        &self.paths
    }

    /// Announce `instance` as online with an ephemeral node
    #[autometrics(objective = API_SLO)]
    pub async fn register_online(
        &self,
        instance: &InstanceMetaData,
    ) -> Result<()> {
        check_instance_id(&instance.id)?;
        let value = serde_json::to_string(&OnlineNodeValue {
            attributes: instance.attributes.clone(),
            version: instance.version.clone(),
        })
        .map_err(SerializationError::Json)?;

        self.repository
            .persist_ephemeral(
                &self.paths.online_path(instance.instance_type, &instance.id),
                &value,
            )
            .await?;
        debug!(instance_id = %instance.id, instance_type = %instance.instance_type, "Registered online");
        Ok(())
    }

    /// Graceful removal of every node owned by `instance`
    pub async fn offline(
        &self,
        instance: &InstanceMetaData,
    ) -> Result<()> {
        let id = instance.id.as_str();
        self.repository
            .delete(&self.paths.online_path(instance.instance_type, id))
            .await?;
        self.repository.delete(&self.paths.labels_path(id)).await?;
        self.repository.delete(&self.paths.status_path(id)).await?;
        self.repository.delete(&self.paths.worker_id_path(id)).await?;
        debug!(instance_id = %id, "Instance offline");
        Ok(())
    }

    pub async fn persist_instance_labels(
        &self,
        instance_id: &str,
        labels: &BTreeSet<String>,
    ) -> Result<()> {
        check_instance_id(instance_id)?;
        let value = serde_json::to_string(labels).map_err(SerializationError::Json)?;
        self.repository
            .persist(&self.paths.labels_path(instance_id), &value)
            .await
    }

    /// Absent, empty or malformed content yields an empty set
    pub async fn load_instance_labels(
        &self,
        instance_id: &str,
    ) -> Result<BTreeSet<String>> {
        let raw = self
            .repository
            .get_directly(&self.paths.labels_path(instance_id))
            .await?;
        Ok(decode_string_set(raw, instance_id, "labels"))
    }

    pub async fn persist_instance_status(
        &self,
        instance_id: &str,
        status: &BTreeSet<String>,
    ) -> Result<()> {
        check_instance_id(instance_id)?;
        let value = serde_json::to_string(status).map_err(SerializationError::Json)?;
        self.repository
            .persist_ephemeral(&self.paths.status_path(instance_id), &value)
            .await
    }

    /// Empty set means healthy
    pub async fn load_instance_status(
        &self,
        instance_id: &str,
    ) -> Result<BTreeSet<String>> {
        let raw = self
            .repository
            .get_directly(&self.paths.status_path(instance_id))
            .await?;
        Ok(decode_string_set(raw, instance_id, "status"))
    }

    /// Worker id node is ephemeral: the id becomes assignable again once the
    /// owning session ends
    pub async fn persist_instance_worker_id(
        &self,
        instance_id: &str,
        worker_id: u32,
    ) -> Result<()> {
        check_instance_id(instance_id)?;
        self.repository
            .persist_ephemeral(&self.paths.worker_id_path(instance_id), &worker_id.to_string())
            .await
    }

    /// Malformed values are logged and reported as unassigned
    pub async fn load_instance_worker_id(
        &self,
        instance_id: &str,
    ) -> Result<Option<u32>> {
        let raw = self
            .repository
            .get_directly(&self.paths.worker_id_path(instance_id))
            .await?;
        Ok(raw.and_then(|value| parse_worker_id(instance_id, &value)))
    }

    /// Hydrate `metadata` with labels, status and worker id
    pub async fn load_compute_node_instance(
        &self,
        metadata: InstanceMetaData,
    ) -> Result<ComputeNodeInstance> {
        let id = metadata.id.clone();
        let mut instance = ComputeNodeInstance::new(metadata);
        instance.labels = self.load_instance_labels(&id).await?;
        instance.status = self.load_instance_status(&id).await?;
        instance.worker_id = self.load_instance_worker_id(&id).await?;
        Ok(instance)
    }

    /// Ids of every online instance of every type
    pub async fn load_online_instance_ids(&self) -> Result<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        for instance_type in InstanceType::ALL {
            let children = self
                .repository
                .get_children_keys(&self.paths.online_root(instance_type))
                .await?;
            ids.extend(children);
        }
        Ok(ids)
    }

    /// Every online instance, hydrated.
    ///
    /// A failed listing is an error; a failed read of one instance is logged
    /// and that instance skipped.
    #[autometrics(objective = API_SLO)]
    pub async fn load_all_compute_node_instances(&self) -> Result<Vec<ComputeNodeInstance>> {
        let mut instances = Vec::new();

        for instance_type in InstanceType::ALL {
            let online_root = self.paths.online_root(instance_type);
            let ids = self.repository.get_children_keys(&online_root).await?;
            ONLINE_INSTANCE_METRIC
                .with_label_values(&[instance_type.as_str()])
                .set(ids.len() as i64);

            for id in ids {
                let raw = match self
                    .repository
                    .get_directly(&self.paths.online_path(instance_type, &id))
                    .await
                {
                    Ok(Some(raw)) => raw,
                    // Gone between listing and read: the instance went offline
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(instance_id = %id, "Failed to read online node, skipped: {:?}", e);
                        continue;
                    }
                };

                let value = serde_json::from_str::<OnlineNodeValue>(&raw).unwrap_or_else(|e| {
                    warn!(instance_id = %id, "Malformed online node value: {:?}", e);
                    MALFORMED_CONTENT_METRIC.with_label_values(&["online"]).inc();
                    OnlineNodeValue::default()
                });
                let metadata = InstanceMetaData::new(id.clone(), instance_type, value.attributes, value.version);
                match self.load_compute_node_instance(metadata).await {
                    Ok(instance) => instances.push(instance),
                    Err(e) => {
                        warn!(instance_id = %id, "Failed to load instance details, skipped: {:?}", e);
                    }
                }
            }
        }

        Ok(instances)
    }

    /// Every worker id currently held by some instance.
    ///
    /// The listing must complete: a failed listing is an error, while a failed
    /// or malformed individual read is logged and that entry skipped.
    #[autometrics(objective = API_SLO)]
    pub async fn get_assigned_worker_ids(&self) -> Result<BTreeSet<u32>> {
        let instance_ids = self
            .repository
            .get_children_keys(&self.paths.worker_id_root())
            .await?;

        let mut assigned = BTreeSet::new();
        for instance_id in instance_ids {
            match self
                .repository
                .get_directly(&self.paths.worker_id_path(&instance_id))
                .await
            {
                Ok(Some(value)) => {
                    if let Some(worker_id) = parse_worker_id(&instance_id, &value) {
                        assigned.insert(worker_id);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(instance_id = %instance_id, "Failed to read worker id, skipped: {:?}", e);
                }
            }
        }
        Ok(assigned)
    }
}

fn check_instance_id(instance_id: &str) -> Result<()> {
    if !is_plain_identifier(instance_id) {
        return Err(RegistryError::InvalidInstanceId(instance_id.to_string()).into());
    }
    Ok(())
}

pub(crate) fn parse_worker_id(
    instance_id: &str,
    value: &str,
) -> Option<u32> {
    match value.trim().parse::<u32>() {
        Ok(worker_id) => Some(worker_id),
        Err(e) => {
            warn!(instance_id, value, "Malformed worker id treated as unassigned: {:?}", e);
            MALFORMED_CONTENT_METRIC.with_label_values(&["worker-id"]).inc();
            None
        }
    }
}

pub(crate) fn decode_string_set(
    raw: Option<String>,
    instance_id: &str,
    node: &'static str,
) -> BTreeSet<String> {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return BTreeSet::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(instance_id, node, "Malformed {} treated as empty: {:?}", node, e);
        MALFORMED_CONTENT_METRIC.with_label_values(&[node]).inc();
        BTreeSet::new()
    })
}
