pub mod transfers;
