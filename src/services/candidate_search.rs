use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    entities::{
        stock_item::{self, Column as StockColumn, Entity as StockItem},
        Location,
    },
    errors::ServiceError,
};

/// Catalog entry a transfer request can be created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Candidate {
    pub part_number: String,
    pub name: String,
    pub brand: Option<String>,
    pub application: Option<String>,
    pub quantity: i32,
    pub shelf_code: Option<String>,
}

impl From<stock_item::Model> for Candidate {
    fn from(item: stock_item::Model) -> Self {
        Self {
            part_number: item.part_number,
            name: item.name,
            brand: item.brand,
            application: item.application,
            quantity: item.quantity,
            shelf_code: item.shelf_code,
        }
    }
}

/// Escapes LIKE wildcards so user input only ever matches literally.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Free-text lookup over one location's catalog.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSearch {
    limit: u64,
}

impl CandidateSearch {
    pub fn new(limit: u64) -> Self {
        Self { limit: limit.max(1) }
    }

    /// Case-insensitive substring match on part number, name, brand or
    /// application. A blank query returns nothing.
    #[instrument(skip(self, conn), fields(location = %location))]
    pub async fn search<C: ConnectionTrait>(
        &self,
        conn: &C,
        query: &str,
        location: Location,
    ) -> Result<Vec<Candidate>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = like_pattern(query);
        let matches_any = [
            StockColumn::PartNumber,
            StockColumn::Name,
            StockColumn::Brand,
            StockColumn::Application,
        ]
        .into_iter()
        .fold(Condition::any(), |cond, column| {
            cond.add(
                Expr::expr(Func::lower(Expr::col(column)))
                    .like(LikeExpr::new(pattern.clone()).escape('\\')),
            )
        });

        let items = StockItem::find()
            .filter(StockColumn::Location.eq(location))
            .filter(matches_any)
            .order_by_asc(StockColumn::PartNumber)
            .limit(self.limit)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(items.into_iter().map(Candidate::from).collect())
    }
}
