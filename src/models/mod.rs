pub mod api;
pub mod card;
