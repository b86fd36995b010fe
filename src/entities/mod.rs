pub mod location;
pub mod stock_item;
pub mod transfer_history;
pub mod transfer_request;

pub use location::Location;
pub use transfer_history::HistoryAction;
pub use transfer_request::TransferStatus;
