pub mod catalog;
pub mod tail;
pub mod timestamp;
