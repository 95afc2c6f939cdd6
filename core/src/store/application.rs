use crate::{
    error::{ReconError, ReconResult},
    mapping::FinancingType,
    types::{format_timestamp, Application, NewApplication, ProductDetails, SELECTED_PLANS},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, application_type, source_id, financing_type, \
     product_url, product_title, product_image, product_price, created_at, updated_at";

/// Raw row before timestamp parsing.
struct ApplicationRow {
    id: String,
    application_type: String,
    source_id: Option<String>,
    financing_type: Option<String>,
    product: ProductDetails,
    created_at: String,
    updated_at: String,
}

impl ApplicationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            application_type: row.get(1)?,
            source_id: row.get(2)?,
            financing_type: row.get(3)?,
            product: ProductDetails {
                url: row.get(4)?,
                title: row.get(5)?,
                image: row.get(6)?,
                price: row.get(7)?,
            },
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_application(self) -> ReconResult<Application> {
        Ok(Application {
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            id: self.id,
            application_type: self.application_type,
            source_id: self.source_id,
            financing_type: self.financing_type,
            product: self.product,
        })
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> ReconResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| ReconError::InvalidTimestamp {
            column,
            value: value.to_string(),
        })
}

fn collect(rows: Vec<ApplicationRow>) -> ReconResult<Vec<Application>> {
    rows.into_iter().map(ApplicationRow::into_application).collect()
}

pub(super) fn insert(
    conn: &Connection,
    record: &NewApplication,
    created_at: DateTime<Utc>,
) -> ReconResult<Application> {
    let id = record
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let ts = format_timestamp(created_at);
    conn.execute(
        "INSERT INTO applications
         (id, application_type, source_id, financing_type,
          product_url, product_title, product_image, product_price, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            record.application_type,
            record.source_id,
            record.financing_type,
            record.product.url,
            record.product.title,
            record.product.image,
            record.product.price,
            ts
        ],
    )?;
    find(conn, &id)?.ok_or(ReconError::ApplicationNotFound { id })
}

pub(super) fn find(conn: &Connection, id: &str) -> ReconResult<Option<Application>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM applications WHERE id = ?1"),
            params![id],
            ApplicationRow::from_row,
        )
        .optional()?;
    row.map(ApplicationRow::into_application).transpose()
}

pub(super) fn recent_candidates(
    conn: &Connection,
    since: DateTime<Utc>,
) -> ReconResult<Vec<Application>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM applications
         WHERE application_type = ?1
           AND source_id IS NOT NULL
           AND created_at >= ?2
         ORDER BY created_at DESC, id ASC"
    ))?;
    let rows = stmt
        .query_map(
            params![SELECTED_PLANS, format_timestamp(since)],
            ApplicationRow::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    collect(rows)
}

pub(super) fn selected_plans(
    conn: &Connection,
    limit: Option<usize>,
) -> ReconResult<Vec<Application>> {
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM applications
         WHERE application_type = ?1
         ORDER BY created_at DESC, id ASC
         LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![SELECTED_PLANS, limit], ApplicationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    collect(rows)
}

pub(super) fn set_financing_type(
    conn: &Connection,
    id: &str,
    target: &str,
    updated_at: DateTime<Utc>,
) -> ReconResult<bool> {
    let changed = conn.execute(
        "UPDATE applications
         SET financing_type = ?1, updated_at = ?2
         WHERE id = ?3 AND financing_type IS NOT ?1",
        params![target, format_timestamp(updated_at), id],
    )?;
    Ok(changed > 0)
}

/// `producto` applications with a source_id whose listing is still
/// missing url, title or image. Newest first.
pub(super) fn product_sync_candidates(conn: &Connection) -> ReconResult<Vec<Application>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM applications
         WHERE application_type = ?1
           AND source_id IS NOT NULL
           AND financing_type = ?2
           AND (product_url IS NULL OR product_title IS NULL OR product_image IS NULL)
         ORDER BY created_at DESC, id ASC"
    ))?;
    let rows = stmt
        .query_map(
            params![SELECTED_PLANS, FinancingType::Producto.as_str()],
            ApplicationRow::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    collect(rows)
}

/// Conditional copy of the product listing. Only touches a row that is
/// still `producto` and differs in at least one field.
pub(super) fn set_product_details(
    conn: &Connection,
    id: &str,
    product: &ProductDetails,
    updated_at: DateTime<Utc>,
) -> ReconResult<bool> {
    let changed = conn.execute(
        "UPDATE applications
         SET product_url = ?1, product_title = ?2, product_image = ?3,
             product_price = ?4, updated_at = ?5
         WHERE id = ?6
           AND financing_type = ?7
           AND (product_url IS NOT ?1 OR product_title IS NOT ?2
                OR product_image IS NOT ?3 OR product_price IS NOT ?4)",
        params![
            product.url,
            product.title,
            product.image,
            product.price,
            format_timestamp(updated_at),
            id,
            FinancingType::Producto.as_str()
        ],
    )?;
    Ok(changed > 0)
}

pub(super) fn overwrite_financing_type(
    conn: &Connection,
    id: &str,
    value: Option<&str>,
) -> ReconResult<()> {
    let changed = conn.execute(
        "UPDATE applications SET financing_type = ?1 WHERE id = ?2",
        params![value, id],
    )?;
    if changed == 0 {
        return Err(ReconError::ApplicationNotFound { id: id.to_string() });
    }
    Ok(())
}

pub(super) fn count(conn: &Connection) -> ReconResult<i64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
    Ok(n)
}
