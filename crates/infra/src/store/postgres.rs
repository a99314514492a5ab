//! Postgres-backed fleet store.
//!
//! Schema lives in `crates/infra/migrations/`; run it with [`PostgresFleetStore::migrate`].
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | `StoreError` |
//! |------------|-----------------|--------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (check violation) | `23514` | `Backend` |
//! | Anything else | | `Backend` |
//!
//! Lifecycle writes are `UPDATE … WHERE id = $1 AND status = $2 AND revision = $3`;
//! zero affected rows means the writer lost the race and the current status is
//! read back for the `Conflict`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use printfleet_core::{
    ClientId, DepartmentId, LifecycleOp, LocationId, Precondition, PrinterModelId, UnitId,
    UnitStatus, UserId,
};
use printfleet_fleet::{
    Assignment, AssignmentRecord, Client, Department, DepartmentStatus, HistoryEntry, Location,
    ModelStatus, PlacementPoint, PrinterModel, UsageType,
};

use super::{
    AssignmentStore, CatalogStore, HierarchyStore, JoinedRow, StoreError, ViewSnapshot, ViewSource,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PostgresFleetStore {
    pool: Arc<PgPool>,
}

impl PostgresFleetStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    async fn current_status(
        tx: &mut Transaction<'_, Postgres>,
        id: UnitId,
    ) -> Result<Option<UnitStatus>, StoreError> {
        let row = sqlx::query("SELECT status FROM assignments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("current_status", e))?;
        row.map(|r| parse_status(&text(&r, "status")?)).transpose()
    }
}

const ASSIGNMENT_COLUMNS: &str = r#"
    a.id, a.printer_model_id, a.client_id, a.department_location_id, a.serial_number,
    a.usage_type, a.status, a.is_client_owned, a.monthly_price, a.last_client_id,
    a.deployment_date, a.maintenance_status, a.notes, a.created_at, a.updated_at, a.revision
"#;

#[async_trait]
impl AssignmentStore for PostgresFleetStore {
    #[instrument(skip(self), fields(unit_id = %id), err)]
    async fn get(&self, id: UnitId) -> Result<Option<Assignment>, StoreError> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments a WHERE a.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_assignment", e))?;
        row.map(|r| assignment_from_row(&r)).transpose()
    }

    #[instrument(skip(self, unit, entry), fields(unit_id = %unit.unit_id()), err)]
    async fn insert(&self, unit: Assignment, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let record = AssignmentRecord::from(&unit);
        sqlx::query(
            r#"
            INSERT INTO assignments (
                id, printer_model_id, client_id, department_location_id, serial_number,
                usage_type, status, is_client_owned, monthly_price, last_client_id,
                deployment_date, maintenance_status, notes, created_at, updated_at, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.printer_model_id.as_uuid())
        .bind(record.client_id.map(|c| *c.as_uuid()))
        .bind(record.department_location_id.map(|l| *l.as_uuid()))
        .bind(&record.serial_number)
        .bind(record.usage_type.as_str())
        .bind(record.status.as_str())
        .bind(record.is_client_owned)
        .bind(record.monthly_price)
        .bind(record.last_client_id.map(|c| *c.as_uuid()))
        .bind(record.deployment_date)
        .bind(&record.maintenance_status)
        .bind(&record.notes)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.revision as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_assignment", e))?;

        insert_history(&mut tx, &entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(
        skip(self, next, entry),
        fields(unit_id = %next.unit_id(), expected_status = %expected.status, expected_revision = expected.revision),
        err
    )]
    async fn commit(
        &self,
        expected: Precondition,
        next: Assignment,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let record = AssignmentRecord::from(&next);
        let updated = sqlx::query(
            r#"
            UPDATE assignments SET
                client_id = $4,
                department_location_id = $5,
                status = $6,
                monthly_price = $7,
                last_client_id = $8,
                deployment_date = $9,
                maintenance_status = $10,
                notes = $11,
                updated_at = $12,
                revision = $13
            WHERE id = $1 AND status = $2 AND revision = $3
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(expected.status.as_str())
        .bind(expected.revision as i64)
        .bind(record.client_id.map(|c| *c.as_uuid()))
        .bind(record.department_location_id.map(|l| *l.as_uuid()))
        .bind(record.status.as_str())
        .bind(record.monthly_price)
        .bind(record.last_client_id.map(|c| *c.as_uuid()))
        .bind(record.deployment_date)
        .bind(&record.maintenance_status)
        .bind(&record.notes)
        .bind(record.updated_at)
        .bind(record.revision as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("commit_assignment", e))?;

        if updated.rows_affected() == 0 {
            let actual = Self::current_status(&mut tx, record.id).await?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict { actual });
        }

        insert_history(&mut tx, &entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(unit_id = %id), err)]
    async fn delete(&self, id: UnitId) -> Result<Assignment, StoreError> {
        let sql = format!("DELETE FROM assignments a WHERE a.id = $1 RETURNING {ASSIGNMENT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_assignment", e))?
            .ok_or_else(|| StoreError::not_found("assignment", id))?;
        assignment_from_row(&row)
    }

    async fn history(&self, id: UnitId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, unit_id, op, from_status, to_status,
                   from_client_id, from_department_id, from_location_id,
                   to_client_id, to_department_id, to_location_id,
                   actor, occurred_at
            FROM assignment_history
            WHERE unit_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_history", e))?;

        rows.iter().map(history_from_row).collect()
    }

    async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Assignment>, StoreError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments a WHERE a.client_id = $1 ORDER BY a.id"
        );
        let rows = sqlx::query(&sql)
            .bind(client_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_for_client", e))?;
        rows.iter().map(assignment_from_row).collect()
    }
}

#[async_trait]
impl HierarchyStore for PostgresFleetStore {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO clients (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(client.id.as_uuid())
            .bind(&client.name)
            .bind(client.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_client", e))?;
        Ok(())
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        let row = sqlx::query("SELECT id, name, created_at FROM clients WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_client", e))?;
        row.map(|r| client_from_row(&r, "")).transpose()
    }

    async fn insert_department(&self, department: Department) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO departments (id, client_id, name, status, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(department.id.as_uuid())
        .bind(department.client_id.as_uuid())
        .bind(&department.name)
        .bind(department_status_str(department.status))
        .bind(department.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_department", e))?;
        Ok(())
    }

    async fn get_department(&self, id: DepartmentId) -> Result<Option<Department>, StoreError> {
        let row = sqlx::query(
            "SELECT id, client_id, name, status, created_at FROM departments WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_department", e))?;
        row.map(|r| department_from_row(&r, "")).transpose()
    }

    async fn set_department_status(
        &self,
        id: DepartmentId,
        status: DepartmentStatus,
    ) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE departments SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(department_status_str(status))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_department_status", e))?;
        if done.rows_affected() == 0 {
            return Err(StoreError::not_found("department", id));
        }
        Ok(())
    }

    async fn departments_of(&self, client_id: ClientId) -> Result<Vec<Department>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, client_id, name, status, created_at FROM departments WHERE client_id = $1",
        )
        .bind(client_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("departments_of", e))?;
        rows.iter().map(|r| department_from_row(r, "")).collect()
    }

    async fn insert_location(&self, location: Location) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO locations (id, department_id, name, address, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(location.id.as_uuid())
        .bind(location.department_id.as_uuid())
        .bind(&location.name)
        .bind(&location.address)
        .bind(location.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_location", e))?;
        Ok(())
    }

    async fn get_location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let row = sqlx::query(
            "SELECT id, department_id, name, address, created_at FROM locations WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_location", e))?;
        row.map(|r| location_from_row(&r, "")).transpose()
    }

    async fn locations_of(&self, department_id: DepartmentId) -> Result<Vec<Location>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, department_id, name, address, created_at FROM locations WHERE department_id = $1",
        )
        .bind(department_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("locations_of", e))?;
        rows.iter().map(|r| location_from_row(r, "")).collect()
    }

    #[instrument(skip(self), fields(client_id = %id), err)]
    async fn delete_client(&self, id: ClientId) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Lock the client row so concurrent department/unit writers serialize
        // behind the re-check.
        let locked = sqlx::query("SELECT id FROM clients WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_client", e))?;
        if locked.is_none() {
            return Err(StoreError::not_found("client", id));
        }

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM departments WHERE client_id = $1 AND status = 'active') AS active_departments,
                (SELECT COUNT(*) FROM assignments WHERE client_id = $1 AND status <> 'decommissioned') AS live_units
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("recheck_client", e))?;

        let active_departments: i64 = row
            .try_get("active_departments")
            .map_err(|e| map_sqlx_error("recheck_client", e))?;
        let live_units: i64 = row
            .try_get("live_units")
            .map_err(|e| map_sqlx_error("recheck_client", e))?;

        if active_departments > 0 {
            return Err(StoreError::PreconditionFailed(format!(
                "client {id} still has {active_departments} active department(s)"
            )));
        }
        if live_units > 0 {
            return Err(StoreError::PreconditionFailed(format!(
                "client {id} still owns {live_units} unit(s)"
            )));
        }

        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_client", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[async_trait]
impl CatalogStore for PostgresFleetStore {
    async fn insert_model(&self, model: PrinterModel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO printer_models (
                id, manufacturer, series, model, name, color, rental_eligible, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(model.id.as_uuid())
        .bind(&model.manufacturer)
        .bind(&model.series)
        .bind(&model.model)
        .bind(&model.name)
        .bind(model.color)
        .bind(model.rental_eligible)
        .bind(model_status_str(model.status))
        .bind(model.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_model", e))?;
        Ok(())
    }

    async fn get_model(&self, id: PrinterModelId) -> Result<Option<PrinterModel>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, manufacturer, series, model, name, color, rental_eligible, status, created_at
            FROM printer_models WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_model", e))?;
        row.map(|r| model_from_row(&r, "")).transpose()
    }

    async fn update_model(&self, model: PrinterModel) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE printer_models SET status = $2 WHERE id = $1")
            .bind(model.id.as_uuid())
            .bind(model_status_str(model.status))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_model", e))?;
        if done.rows_affected() == 0 {
            return Err(StoreError::not_found("printer model", model.id));
        }
        Ok(())
    }
}

#[async_trait]
impl ViewSource for PostgresFleetStore {
    #[instrument(skip(self), err)]
    async fn fetch_snapshot(&self) -> Result<ViewSnapshot, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot_isolation", e))?;

        let sql = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS},
                   m.id AS m_id, m.manufacturer AS m_manufacturer, m.series AS m_series,
                   m.model AS m_model, m.name AS m_name, m.color AS m_color,
                   m.rental_eligible AS m_rental_eligible, m.status AS m_status,
                   m.created_at AS m_created_at,
                   c.id AS c_id, c.name AS c_name, c.created_at AS c_created_at,
                   l.id AS l_id, l.department_id AS l_department_id, l.name AS l_name,
                   l.address AS l_address, l.created_at AS l_created_at,
                   d.id AS d_id, d.client_id AS d_client_id, d.name AS d_name,
                   d.status AS d_status, d.created_at AS d_created_at
            FROM assignments a
            LEFT JOIN printer_models m ON m.id = a.printer_model_id
            LEFT JOIN clients c ON c.id = a.client_id
            LEFT JOIN locations l ON l.id = a.department_location_id
            LEFT JOIN departments d ON d.id = l.department_id
            ORDER BY a.id
            "#
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_joined", e))?;

        let catalog_rows = sqlx::query(
            r#"
            SELECT id, manufacturer, series, model, name, color, rental_eligible, status, created_at
            FROM printer_models
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_catalog", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let rows = rows
            .iter()
            .map(|r| {
                let assignment = record_from_row(r)?;
                let has = |col: &str| -> Result<bool, StoreError> {
                    Ok(r.try_get::<Option<Uuid>, _>(col)
                        .map_err(|e| map_sqlx_error("fetch_joined", e))?
                        .is_some())
                };
                Ok(JoinedRow {
                    assignment,
                    model: if has("m_id")? { Some(model_from_row(r, "m_")?) } else { None },
                    client: if has("c_id")? { Some(client_from_row(r, "c_")?) } else { None },
                    location: if has("l_id")? { Some(location_from_row(r, "l_")?) } else { None },
                    department: if has("d_id")? {
                        Some(department_from_row(r, "d_")?)
                    } else {
                        None
                    },
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let catalog = catalog_rows
            .iter()
            .map(|r| model_from_row(r, ""))
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(ViewSnapshot { rows, catalog })
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    entry: &HistoryEntry,
) -> Result<(), StoreError> {
    let op = serde_json::to_value(entry.op)
        .map_err(|e| StoreError::Backend(format!("history op serialization failed: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO assignment_history (
            id, unit_id, op, from_status, to_status,
            from_client_id, from_department_id, from_location_id,
            to_client_id, to_department_id, to_location_id,
            actor, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.unit_id.as_uuid())
    .bind(op)
    .bind(entry.from_status.as_str())
    .bind(entry.to_status.as_str())
    .bind(entry.from.client_id.map(|c| *c.as_uuid()))
    .bind(entry.from.department_id.map(|d| *d.as_uuid()))
    .bind(entry.from.location_id.map(|l| *l.as_uuid()))
    .bind(entry.to.client_id.map(|c| *c.as_uuid()))
    .bind(entry.to.department_id.map(|d| *d.as_uuid()))
    .bind(entry.to.location_id.map(|l| *l.as_uuid()))
    .bind(entry.actor.map(|a| *a.as_uuid()))
    .bind(entry.occurred_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_history", e))?;
    Ok(())
}

// Row decoding

fn get<'r, T>(row: &'r PgRow, col: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(col)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {col}: {e}")))
}

fn text(row: &PgRow, col: &str) -> Result<String, StoreError> {
    get::<String>(row, col)
}

fn record_from_row(row: &PgRow) -> Result<AssignmentRecord, StoreError> {
    let revision: i64 = get(row, "revision")?;
    Ok(AssignmentRecord {
        id: UnitId::from_uuid(get(row, "id")?),
        printer_model_id: PrinterModelId::from_uuid(get(row, "printer_model_id")?),
        client_id: get::<Option<Uuid>>(row, "client_id")?.map(ClientId::from_uuid),
        department_location_id: get::<Option<Uuid>>(row, "department_location_id")?
            .map(LocationId::from_uuid),
        serial_number: text(row, "serial_number")?,
        usage_type: UsageType::parse(&text(row, "usage_type")?).map_err(decode_error)?,
        status: parse_status(&text(row, "status")?)?,
        is_client_owned: get(row, "is_client_owned")?,
        monthly_price: get(row, "monthly_price")?,
        deployment_date: get::<Option<NaiveDate>>(row, "deployment_date")?,
        maintenance_status: get(row, "maintenance_status")?,
        notes: get(row, "notes")?,
        last_client_id: get::<Option<Uuid>>(row, "last_client_id")?.map(ClientId::from_uuid),
        created_at: get::<DateTime<Utc>>(row, "created_at")?,
        updated_at: get::<DateTime<Utc>>(row, "updated_at")?,
        revision: revision as u64,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<Assignment, StoreError> {
    Assignment::try_from(record_from_row(row)?).map_err(decode_error)
}

fn history_from_row(row: &PgRow) -> Result<HistoryEntry, StoreError> {
    let op: serde_json::Value = get(row, "op")?;
    let op: LifecycleOp = serde_json::from_value(op)
        .map_err(|e| StoreError::Backend(format!("failed to decode history op: {e}")))?;
    let point = |prefix: &str| -> Result<PlacementPoint, StoreError> {
        Ok(PlacementPoint {
            client_id: get::<Option<Uuid>>(row, &format!("{prefix}client_id"))?
                .map(ClientId::from_uuid),
            department_id: get::<Option<Uuid>>(row, &format!("{prefix}department_id"))?
                .map(DepartmentId::from_uuid),
            location_id: get::<Option<Uuid>>(row, &format!("{prefix}location_id"))?
                .map(LocationId::from_uuid),
        })
    };
    Ok(HistoryEntry {
        id: printfleet_core::HistoryEntryId::from_uuid(get(row, "id")?),
        unit_id: UnitId::from_uuid(get(row, "unit_id")?),
        op,
        from_status: parse_status(&text(row, "from_status")?)?,
        to_status: parse_status(&text(row, "to_status")?)?,
        from: point("from_")?,
        to: point("to_")?,
        actor: get::<Option<Uuid>>(row, "actor")?.map(UserId::from_uuid),
        occurred_at: get(row, "occurred_at")?,
    })
}

fn client_from_row(row: &PgRow, prefix: &str) -> Result<Client, StoreError> {
    Ok(Client {
        id: ClientId::from_uuid(get(row, &format!("{prefix}id"))?),
        name: text(row, &format!("{prefix}name"))?,
        created_at: get(row, &format!("{prefix}created_at"))?,
    })
}

fn department_from_row(row: &PgRow, prefix: &str) -> Result<Department, StoreError> {
    let status = match text(row, &format!("{prefix}status"))?.as_str() {
        "active" => DepartmentStatus::Active,
        "inactive" => DepartmentStatus::Inactive,
        other => return Err(StoreError::Backend(format!("unknown department status '{other}'"))),
    };
    Ok(Department {
        id: DepartmentId::from_uuid(get(row, &format!("{prefix}id"))?),
        client_id: ClientId::from_uuid(get(row, &format!("{prefix}client_id"))?),
        name: text(row, &format!("{prefix}name"))?,
        status,
        created_at: get(row, &format!("{prefix}created_at"))?,
    })
}

fn location_from_row(row: &PgRow, prefix: &str) -> Result<Location, StoreError> {
    Ok(Location {
        id: LocationId::from_uuid(get(row, &format!("{prefix}id"))?),
        department_id: DepartmentId::from_uuid(get(row, &format!("{prefix}department_id"))?),
        name: text(row, &format!("{prefix}name"))?,
        address: get(row, &format!("{prefix}address"))?,
        created_at: get(row, &format!("{prefix}created_at"))?,
    })
}

fn model_from_row(row: &PgRow, prefix: &str) -> Result<PrinterModel, StoreError> {
    let status = match text(row, &format!("{prefix}status"))?.as_str() {
        "active" => ModelStatus::Active,
        "deleted" => ModelStatus::Deleted,
        other => return Err(StoreError::Backend(format!("unknown model status '{other}'"))),
    };
    Ok(PrinterModel {
        id: PrinterModelId::from_uuid(get(row, &format!("{prefix}id"))?),
        manufacturer: text(row, &format!("{prefix}manufacturer"))?,
        series: get(row, &format!("{prefix}series"))?,
        model: text(row, &format!("{prefix}model"))?,
        name: text(row, &format!("{prefix}name"))?,
        color: get(row, &format!("{prefix}color"))?,
        rental_eligible: get(row, &format!("{prefix}rental_eligible"))?,
        status,
        created_at: get(row, &format!("{prefix}created_at"))?,
    })
}

fn parse_status(s: &str) -> Result<UnitStatus, StoreError> {
    s.parse::<UnitStatus>().map_err(decode_error)
}

fn department_status_str(status: DepartmentStatus) -> &'static str {
    match status {
        DepartmentStatus::Active => "active",
        DepartmentStatus::Inactive => "inactive",
    }
}

fn model_status_str(status: ModelStatus) -> &'static str {
    match status {
        ModelStatus::Active => "active",
        ModelStatus::Deleted => "deleted",
    }
}

fn decode_error(err: printfleet_core::DomainError) -> StoreError {
    StoreError::Backend(format!("stored row is invalid: {err}"))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::NotFound {
                    entity: "referenced row",
                    id: db_err.constraint().unwrap_or("unknown").to_string(),
                },
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
