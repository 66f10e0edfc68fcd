pub mod entities;
pub mod price_catalog;
pub mod proration;
pub mod reducer;
