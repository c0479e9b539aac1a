//! Override fixer: make the target's copy of one record match the base.

use std::marker::PhantomData;
use std::sync::Arc;

use migrator_core::{
    CancellationToken, ConnPool, Entity, MigratorError, MigratorResult, StorageError,
};
use rusqlite::types::Value;
use tracing::{debug, info};

/// Repairs records in `target` from the authoritative `base`.
///
/// Repair is idempotent: a found record is upserted with every column the
/// target models, a missing one is deleted from the target.
pub struct OverrideFixer<T: Entity> {
    base: Arc<dyn ConnPool>,
    target: Arc<dyn ConnPool>,
    columns: Vec<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> OverrideFixer<T> {
    /// Introspects the target's columns once; repair never writes others.
    pub fn new(base: Arc<dyn ConnPool>, target: Arc<dyn ConnPool>) -> MigratorResult<Self> {
        let sample = target.query(&format!("SELECT * FROM {} LIMIT 1", T::TABLE), &[])?;
        let columns = sample.columns().to_vec();
        if !columns.iter().any(|c| c.eq_ignore_ascii_case("id")) {
            return Err(StorageError::SchemaMismatch {
                message: format!("target table {} has no id column", T::TABLE),
            }
            .into());
        }
        debug!(table = T::TABLE, columns = columns.len(), "fixer target columns loaded");
        Ok(Self {
            base,
            target,
            columns,
            _entity: PhantomData,
        })
    }

    /// Columns the upsert is restricted to.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Bring `id` in the target in line with the base.
    ///
    /// Read failures on the base are returned untouched so the caller can
    /// redeliver. An expired or cancelled `token` aborts before any write.
    pub fn fix(&self, token: &CancellationToken, id: i64) -> MigratorResult<()> {
        ensure_live(token, id)?;
        let rows = self.base.query(
            &format!("SELECT * FROM {} WHERE id = ?1", T::TABLE),
            &[Value::Integer(id)],
        )?;
        ensure_live(token, id)?;

        match rows.first() {
            Some(row) => {
                let entity = T::from_row(&row)?;
                self.upsert(&entity)
            }
            None => self.delete(id),
        }
    }

    fn upsert(&self, entity: &T) -> MigratorResult<()> {
        let (columns, args): (Vec<&str>, Vec<Value>) = entity
            .to_columns()
            .into_iter()
            .filter(|(name, _)| self.columns.iter().any(|c| c.eq_ignore_ascii_case(name)))
            .unzip();
        let sql = upsert_sql(T::TABLE, &columns);
        self.target.execute(&sql, &args)?;
        info!(table = T::TABLE, id = entity.id(), "record overwritten in target");
        Ok(())
    }

    fn delete(&self, id: i64) -> MigratorResult<()> {
        let deleted = self.target.execute(
            &format!("DELETE FROM {} WHERE id = ?1", T::TABLE),
            &[Value::Integer(id)],
        )?;
        if deleted > 0 {
            info!(table = T::TABLE, id, "record deleted from target");
        }
        Ok(())
    }
}

fn ensure_live(token: &CancellationToken, id: i64) -> MigratorResult<()> {
    if token.is_cancelled() {
        return Err(MigratorError::Cancelled {
            operation: format!("fix id {id}"),
        });
    }
    Ok(())
}

/// `INSERT ... ON CONFLICT(id) DO UPDATE SET c = excluded.c` over `columns`.
fn upsert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !c.eq_ignore_ascii_case("id"))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    let on_conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT(id) {on_conflict}",
        columns.join(", "),
        placeholders.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_sql_updates_every_non_key_column() {
        assert_eq!(
            upsert_sql("t", &["id", "a", "b"]),
            "INSERT INTO t (id, a, b) VALUES (?1, ?2, ?3) ON CONFLICT(id) DO UPDATE SET a = excluded.a, b = excluded.b"
        );
    }

    #[test]
    fn upsert_sql_key_only() {
        assert_eq!(
            upsert_sql("t", &["id"]),
            "INSERT INTO t (id) VALUES (?1) ON CONFLICT(id) DO NOTHING"
        );
    }
}
