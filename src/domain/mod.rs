pub mod catalog;
pub mod events;
pub mod ports;
pub mod purchase;
