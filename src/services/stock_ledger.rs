use chrono::Utc;
use sea_orm::{
    sea_query::{Alias, Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    Set,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        stock_item::{self, Column as StockColumn, Entity as StockItem},
        Location,
    },
    errors::ServiceError,
    metrics,
};

/// Catalog fields copied into a new ledger row when a credit lands on a
/// part number the location has never stocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub name: String,
    pub brand: Option<String>,
    pub application: Option<String>,
}

/// Row to seed into a location's ledger.
#[derive(Debug, Clone)]
pub struct NewStockItem {
    pub location: Location,
    pub part_number: String,
    pub name: String,
    pub brand: Option<String>,
    pub application: Option<String>,
    pub quantity: i32,
    pub shelf_code: Option<String>,
}

/// Per-location stock ledger backed by the `stock_items` table.
///
/// All methods take the connection explicitly so they compose with the
/// caller's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockLedger {
    allow_negative: bool,
}

impl StockLedger {
    pub fn new(allow_negative: bool) -> Self {
        Self { allow_negative }
    }

    pub async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        location: Location,
        part_number: &str,
    ) -> Result<Option<stock_item::Model>, ServiceError> {
        StockItem::find()
            .filter(StockColumn::Location.eq(location))
            .filter(StockColumn::PartNumber.eq(part_number))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Quantity on hand; a part number the location has never stocked reads as zero.
    pub async fn get_quantity<C: ConnectionTrait>(
        &self,
        conn: &C,
        location: Location,
        part_number: &str,
    ) -> Result<i32, ServiceError> {
        Ok(self
            .find(conn, location, part_number)
            .await?
            .map(|item| item.quantity)
            .unwrap_or(0))
    }

    pub async fn get_shelf_code<C: ConnectionTrait>(
        &self,
        conn: &C,
        location: Location,
        part_number: &str,
    ) -> Result<Option<String>, ServiceError> {
        Ok(self
            .find(conn, location, part_number)
            .await?
            .and_then(|item| item.shelf_code))
    }

    /// Applies `delta` as a single `quantity = quantity + delta` statement and
    /// returns the resulting quantity.
    ///
    /// Debits that would take the quantity below zero fail with `LedgerError`
    /// unless negative stock is allowed. A missing row is a `LedgerError`.
    #[instrument(skip(self, conn), fields(location = %location))]
    pub async fn adjust_quantity<C: ConnectionTrait>(
        &self,
        conn: &C,
        location: Location,
        part_number: &str,
        delta: i32,
    ) -> Result<i32, ServiceError> {
        let mut update = StockItem::update_many()
            .col_expr(
                StockColumn::Quantity,
                Expr::col(StockColumn::Quantity).add(delta),
            )
            .col_expr(StockColumn::UpdatedAt, Expr::value(Utc::now()))
            .filter(StockColumn::Location.eq(location))
            .filter(StockColumn::PartNumber.eq(part_number));

        if delta < 0 && !self.allow_negative {
            update = update.filter(StockColumn::Quantity.gte(-delta));
        }

        let result = update.exec(conn).await.map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(match self.find(conn, location, part_number).await? {
                Some(item) => {
                    warn!(
                        part_number,
                        on_hand = item.quantity,
                        delta,
                        "insufficient stock for debit"
                    );
                    ServiceError::LedgerError(format!(
                        "Insufficient stock for {} at {}: on hand {}, requested {}",
                        part_number, location, item.quantity, -delta
                    ))
                }
                None => ServiceError::LedgerError(format!(
                    "No stock record for {} at {}",
                    part_number, location
                )),
            });
        }

        metrics::record_stock_adjustment(&location.to_string(), delta);
        let new_quantity = self.get_quantity(conn, location, part_number).await?;
        debug!(part_number, delta, new_quantity, "stock adjusted");
        Ok(new_quantity)
    }

    /// Credits `quantity` in a single upsert, creating the ledger row from
    /// `snapshot` when the location has never stocked the part number.
    #[instrument(skip(self, conn, snapshot), fields(location = %location))]
    pub async fn credit<C: ConnectionTrait>(
        &self,
        conn: &C,
        location: Location,
        part_number: &str,
        quantity: i32,
        snapshot: &ItemSnapshot,
    ) -> Result<i32, ServiceError> {
        let row = stock_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            location: Set(location),
            part_number: Set(part_number.to_string()),
            name: Set(snapshot.name.clone()),
            brand: Set(snapshot.brand.clone()),
            application: Set(snapshot.application.clone()),
            quantity: Set(quantity),
            shelf_code: Set(None),
            updated_at: Set(Utc::now()),
        };

        StockItem::insert(row)
            .on_conflict(
                OnConflict::columns([StockColumn::Location, StockColumn::PartNumber])
                    .value(
                        StockColumn::Quantity,
                        Expr::col((StockItem, StockColumn::Quantity))
                            .add(Expr::col((Alias::new("excluded"), StockColumn::Quantity))),
                    )
                    .update_column(StockColumn::UpdatedAt)
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::db_error)?;

        metrics::record_stock_adjustment(&location.to_string(), quantity);
        let new_quantity = self.get_quantity(conn, location, part_number).await?;
        debug!(part_number, quantity, new_quantity, "stock credited");
        Ok(new_quantity)
    }

    pub async fn insert_item<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: NewStockItem,
    ) -> Result<stock_item::Model, ServiceError> {
        stock_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            location: Set(item.location),
            part_number: Set(item.part_number),
            name: Set(item.name),
            brand: Set(item.brand),
            application: Set(item.application),
            quantity: Set(item.quantity),
            shelf_code: Set(item.shelf_code),
            updated_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)
    }
}
