use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One of the two warehouse sites, each with its own stock ledger.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[strum(ascii_case_insensitive)]
pub enum Location {
    #[sea_orm(string_value = "A")]
    A,
    #[sea_orm(string_value = "B")]
    B,
}

impl Location {
    /// The counterpart site.
    pub fn other(self) -> Self {
        match self {
            Location::A => Location::B,
            Location::B => Location::A,
        }
    }
}
