use std::collections::{BTreeMap, BTreeSet, HashMap};

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::{
    dto::transfers::TransferResponse,
    entities::{
        stock_item::{self, Column as StockColumn, Entity as StockItem},
        transfer_request, Location,
    },
    errors::ServiceError,
};

/// Shelf code reported for a part number a location does not stock.
pub const MISSING_SHELF: &str = "-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockPair {
    #[serde(rename = "A")]
    pub a: i32,
    #[serde(rename = "B")]
    pub b: i32,
}

impl StockPair {
    pub fn at(&self, location: Location) -> i32 {
        match location {
            Location::A => self.a,
            Location::B => self.b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShelfPair {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
}

impl Default for ShelfPair {
    fn default() -> Self {
        Self {
            a: MISSING_SHELF.to_string(),
            b: MISSING_SHELF.to_string(),
        }
    }
}

impl ShelfPair {
    pub fn at(&self, location: Location) -> &str {
        match location {
            Location::A => &self.a,
            Location::B => &self.b,
        }
    }
}

/// A request together with both locations' stock and the sender's shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnnotatedTransfer {
    #[serde(flatten)]
    pub transfer: TransferResponse,
    pub stock: StockPair,
    pub sender_shelf: String,
}

/// Cross-location lookups that resolve a whole list of part numbers with one
/// `IN (...)` query per batch.
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    batch_size: usize,
}

impl Comparator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    async fn fetch<C: ConnectionTrait>(
        &self,
        conn: &C,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<stock_item::Model>, ServiceError> {
        let keys: Vec<&String> = keys.iter().collect();
        let mut rows = Vec::new();
        for chunk in keys.chunks(self.batch_size) {
            let batch = StockItem::find()
                .filter(StockColumn::PartNumber.is_in(chunk.iter().map(|k| k.as_str())))
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?;
            rows.extend(batch);
        }
        debug!(keys = keys.len(), rows = rows.len(), "fetched stock rows");
        Ok(rows)
    }

    fn keys<'a>(part_numbers: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        part_numbers
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Quantities at both locations for every requested part number; unknown
    /// part numbers read as zero.
    #[instrument(skip(self, conn, part_numbers), fields(count = part_numbers.len()))]
    pub async fn stock_comparison<C: ConnectionTrait>(
        &self,
        conn: &C,
        part_numbers: &[String],
    ) -> Result<BTreeMap<String, StockPair>, ServiceError> {
        let keys = Self::keys(part_numbers.iter().map(String::as_str));
        let rows = self.fetch(conn, &keys).await?;
        Ok(stock_map(keys, &rows))
    }

    /// Shelf codes at both locations; unknown or blank shelves read as `-`.
    #[instrument(skip(self, conn, part_numbers), fields(count = part_numbers.len()))]
    pub async fn shelf_comparison<C: ConnectionTrait>(
        &self,
        conn: &C,
        part_numbers: &[String],
    ) -> Result<BTreeMap<String, ShelfPair>, ServiceError> {
        let keys = Self::keys(part_numbers.iter().map(String::as_str));
        let rows = self.fetch(conn, &keys).await?;
        Ok(shelf_map(keys, &rows))
    }

    /// Attaches stock at both locations and the shelf code at each request's
    /// sender location, sharing one lookup across the whole list.
    pub async fn annotate<C: ConnectionTrait>(
        &self,
        conn: &C,
        requests: Vec<transfer_request::Model>,
    ) -> Result<Vec<AnnotatedTransfer>, ServiceError> {
        let keys = Self::keys(requests.iter().map(|r| r.part_number.as_str()));
        let rows = self.fetch(conn, &keys).await?;
        let stock = stock_map(keys.clone(), &rows);
        let shelves = shelf_map(keys, &rows);

        Ok(requests
            .into_iter()
            .map(|request| {
                let key = request.part_number.trim();
                let pair = stock.get(key).copied().unwrap_or_default();
                let sender_shelf = shelves
                    .get(key)
                    .map(|s| s.at(request.from_location).to_string())
                    .unwrap_or_else(|| MISSING_SHELF.to_string());
                AnnotatedTransfer {
                    transfer: request.into(),
                    stock: pair,
                    sender_shelf,
                }
            })
            .collect())
    }
}

fn stock_map(keys: BTreeSet<String>, rows: &[stock_item::Model]) -> BTreeMap<String, StockPair> {
    let found: HashMap<(&str, Location), i32> = rows
        .iter()
        .map(|row| ((row.part_number.as_str(), row.location), row.quantity))
        .collect();

    keys.into_iter()
        .map(|key| {
            let pair = StockPair {
                a: found.get(&(key.as_str(), Location::A)).copied().unwrap_or(0),
                b: found.get(&(key.as_str(), Location::B)).copied().unwrap_or(0),
            };
            (key, pair)
        })
        .collect()
}

fn shelf_map(keys: BTreeSet<String>, rows: &[stock_item::Model]) -> BTreeMap<String, ShelfPair> {
    let found: HashMap<(&str, Location), &str> = rows
        .iter()
        .filter_map(|row| {
            row.shelf_code
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|shelf| ((row.part_number.as_str(), row.location), shelf))
        })
        .collect();

    let shelf = |key: &str, location| {
        found
            .get(&(key, location))
            .map(|s| s.to_string())
            .unwrap_or_else(|| MISSING_SHELF.to_string())
    };

    keys.into_iter()
        .map(|key| {
            let pair = ShelfPair {
                a: shelf(&key, Location::A),
                b: shelf(&key, Location::B),
            };
            (key, pair)
        })
        .collect()
}
