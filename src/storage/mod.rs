pub mod checksum;
pub mod image;
