pub mod candidate_search;
pub mod stock_ledger;
pub mod transfers;
