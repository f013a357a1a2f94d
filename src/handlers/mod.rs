pub mod cards;
pub mod fallback;
pub mod health;
