use crate::{
    error::ReconResult,
    types::{ProductDetails, SourcePlan},
};
use rusqlite::{params, Connection, OptionalExtension};

pub(super) fn insert(conn: &Connection, plan: &SourcePlan) -> ReconResult<()> {
    conn.execute(
        "INSERT INTO selected_plans
         (id, simulation_type, product_url, product_title, product_image, product_price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            plan.id,
            plan.simulation_type,
            plan.product.url,
            plan.product.title,
            plan.product.image,
            plan.product.price
        ],
    )?;
    Ok(())
}

/// Also used by the insert-time trigger, which runs on the transaction
/// that is writing the Application.
pub(crate) fn find(conn: &Connection, id: &str) -> ReconResult<Option<SourcePlan>> {
    let plan = conn
        .query_row(
            "SELECT id, simulation_type, product_url, product_title, product_image, product_price
             FROM selected_plans WHERE id = ?1",
            params![id],
            |row| {
                Ok(SourcePlan {
                    id: row.get(0)?,
                    simulation_type: row.get(1)?,
                    product: ProductDetails {
                        url: row.get(2)?,
                        title: row.get(3)?,
                        image: row.get(4)?,
                        price: row.get(5)?,
                    },
                })
            },
        )
        .optional()?;
    Ok(plan)
}
