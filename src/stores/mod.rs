pub mod card_table;
