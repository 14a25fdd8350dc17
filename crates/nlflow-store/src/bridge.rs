//! [`PersistenceBridge`] backed by SQLite.

use async_trait::async_trait;

use nlflow_engine::{Event, PersistenceBridge};
use nlflow_kernel::Step;

use crate::db::Database;
use crate::event_store::EventLogStore;
use crate::workflow_store::WorkflowStore;

/// Writes workflows and events handed over by the workflow service.
#[derive(Clone)]
pub struct SqliteBridge {
    workflows: WorkflowStore,
    events: EventLogStore,
}

impl SqliteBridge {
    pub fn new(db: Database) -> Self {
        Self {
            workflows: WorkflowStore::new(db.clone()),
            events: EventLogStore::new(db),
        }
    }

    pub fn workflows(&self) -> &WorkflowStore {
        &self.workflows
    }

    pub fn events(&self) -> &EventLogStore {
        &self.events
    }
}

#[async_trait]
impl PersistenceBridge for SqliteBridge {
    async fn upsert_workflow(&self, step: &Step, source: Option<&str>) -> nlflow_engine::Result<()> {
        Ok(self.workflows.upsert(step, source).await?)
    }

    async fn save_event(&self, event: &Event) -> nlflow_engine::Result<()> {
        self.events.save_event(event).await?;
        Ok(())
    }
}
