pub mod reference;
pub mod watchlist;
