pub mod address;
pub mod chain;
pub mod cid;
pub mod deal;
pub mod piece;
pub mod signature;
pub mod token_amount;
