use std::sync::Arc;

use autometrics::autometrics;
use tracing::debug;
use tracing::info;

use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::ClusterPersistRepository;
use crate::ComputeNodePersistService;
use crate::RegistryError;
use crate::Result;
use crate::API_SLO;

/// Assigns a cluster-unique worker id to the local instance.
///
/// A candidate id is claimed with an exclusive ephemeral reservation node, so
/// two instances racing for the same free id cannot both win. The reservation
/// and the worker id node share the session lifetime of the instance.
#[derive(Clone)]
pub struct WorkerIdGenerator {
    registry: ComputeNodePersistService,
    repository: Arc<dyn ClusterPersistRepository>,
    instance_id: String,
    max_worker_id: u32,
    retry: BackoffPolicy,
}

impl std::fmt::Debug for WorkerIdGenerator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WorkerIdGenerator")
            .field("instance_id", &self.instance_id)
            .field("max_worker_id", &self.max_worker_id)
            .finish_non_exhaustive()
    }
}

impl WorkerIdGenerator {
    pub fn new(
        registry: ComputeNodePersistService,
        repository: Arc<dyn ClusterPersistRepository>,
        instance_id: impl Into<String>,
        max_worker_id: u32,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            registry,
            repository,
            instance_id: instance_id.into(),
            max_worker_id,
            retry,
        }
    }

    /// Existing worker id of this instance, or the smallest free one
    #[autometrics(objective = API_SLO)]
    pub async fn next_worker_id(&self) -> Result<u32> {
        if let Some(worker_id) = self.registry.load_instance_worker_id(&self.instance_id).await? {
            debug!(instance_id = %self.instance_id, worker_id, "Reusing assigned worker id");
            return Ok(worker_id);
        }

        let worker_id =
            task_with_timeout_and_exponential_backoff(|| self.reserve(), self.retry).await?;
        self.registry
            .persist_instance_worker_id(&self.instance_id, worker_id)
            .await?;

        info!(instance_id = %self.instance_id, worker_id, "Worker id assigned");
        Ok(worker_id)
    }

    async fn reserve(&self) -> Result<u32> {
        let assigned = self.registry.get_assigned_worker_ids().await?;
        let paths = self.registry.paths();

        for candidate in (0..=self.max_worker_id).filter(|id| !assigned.contains(id)) {
            let reservation = paths.worker_id_reservation_path(candidate);
            if self
                .repository
                .persist_exclusive_ephemeral(&reservation, &self.instance_id)
                .await?
            {
                return Ok(candidate);
            }
            // A reservation left by an earlier attempt of this instance
            if self.repository.get_directly(&reservation).await?.as_deref()
                == Some(self.instance_id.as_str())
            {
                return Ok(candidate);
            }
            debug!(candidate, "Worker id reserved by another instance");
        }

        Err(RegistryError::WorkerIdExhausted {
            max_worker_id: self.max_worker_id,
        }
        .into())
    }
}
