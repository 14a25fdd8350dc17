//! Numeric conditions extracted by the normalizer, keyed by workflow.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use nlflow_intent::{NumericCondition, NumericOperator};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// A numeric condition with its row id and owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCondition {
    pub id: i64,
    pub workflow_id: String,
    pub step_id: String,
    pub condition: NumericCondition,
    /// Human-readable form, e.g. `stock < 5 szt`.
    pub raw: String,
}

fn render(c: &NumericCondition) -> String {
    match &c.unit {
        Some(unit) => format!("{} {} {} {unit}", c.field, c.operator.symbol(), c.value),
        None => format!("{} {} {}", c.field, c.operator.symbol(), c.value),
    }
}

fn parse_operator(symbol: &str) -> StoreResult<NumericOperator> {
    serde_json::from_value(Value::String(symbol.to_owned())).map_err(|e| StoreError::Corrupt {
        entity: "condition",
        reason: format!("operator `{symbol}`: {e}"),
    })
}

const INSERT: &str = "INSERT INTO conditions (workflow_id, step_id, field, operator, value, unit, raw) \
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

#[derive(Clone)]
pub struct ConditionStore {
    db: Database,
}

impl ConditionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one condition.  Returns the new row id.
    #[instrument(skip(self, condition))]
    pub async fn save(
        &self,
        workflow_id: &str,
        step_id: &str,
        condition: &NumericCondition,
    ) -> StoreResult<i64> {
        let (workflow_id, step_id) = (workflow_id.to_owned(), step_id.to_owned());
        let c = condition.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    INSERT,
                    rusqlite::params![
                        workflow_id,
                        step_id,
                        c.field,
                        c.operator.symbol(),
                        c.value,
                        c.unit,
                        render(&c)
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Replace every condition of a workflow with `conditions`.
    #[instrument(skip(self, conditions), fields(count = conditions.len()))]
    pub async fn save_all(
        &self,
        workflow_id: &str,
        step_id: &str,
        conditions: &[NumericCondition],
    ) -> StoreResult<()> {
        let (workflow_id, step_id) = (workflow_id.to_owned(), step_id.to_owned());
        let conditions = conditions.to_vec();
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM conditions WHERE workflow_id = ?1", [&workflow_id])?;
                for c in &conditions {
                    tx.execute(
                        INSERT,
                        rusqlite::params![
                            workflow_id,
                            step_id,
                            c.field,
                            c.operator.symbol(),
                            c.value,
                            c.unit,
                            render(c)
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Conditions of one workflow in insertion order.
    #[instrument(skip(self))]
    pub async fn list_for_workflow(&self, workflow_id: &str) -> StoreResult<Vec<StoredCondition>> {
        let workflow_id = workflow_id.to_owned();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_id, step_id, field, operator, value, unit, raw \
                     FROM conditions WHERE workflow_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([&workflow_id], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, f64>(5)?,
                            row.get::<_, Option<String>>(6)?,
                            row.get::<_, String>(7)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(
                        |(id, workflow_id, step_id, field, operator, value, unit, raw)| -> StoreResult<StoredCondition> {
                            Ok(StoredCondition {
                                id,
                                workflow_id,
                                step_id,
                                condition: NumericCondition {
                                    field,
                                    operator: parse_operator(&operator)?,
                                    value,
                                    unit,
                                },
                                raw,
                            })
                        },
                    )
                    .collect()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(op: NumericOperator, value: f64, unit: Option<&str>) -> NumericCondition {
        NumericCondition {
            field: "stock".into(),
            operator: op,
            value,
            unit: unit.map(str::to_owned),
        }
    }

    async fn store() -> ConditionStore {
        ConditionStore::new(Database::in_memory_migrated().await.unwrap())
    }

    #[tokio::test]
    async fn save_and_list() {
        let store = store().await;
        let c = cond(NumericOperator::Lt, 1.0, Some("pieces"));
        let id = store.save("wf", "wf", &c).await.unwrap();

        let listed = store.list_for_workflow("wf").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].condition, c);
        assert_eq!(listed[0].raw, "stock < 1 pieces");
        assert!(store.list_for_workflow("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_all_replaces() {
        let store = store().await;
        store
            .save_all("wf", "wf", &[cond(NumericOperator::Lt, 1.0, None), cond(NumericOperator::Gt, 80.0, Some("percent"))])
            .await
            .unwrap();
        store
            .save_all("wf", "wf", &[cond(NumericOperator::Eq, 3.5, None)])
            .await
            .unwrap();

        let listed = store.list_for_workflow("wf").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].condition.operator, NumericOperator::Eq);
        assert_eq!(listed[0].raw, "stock == 3.5");
    }
}
