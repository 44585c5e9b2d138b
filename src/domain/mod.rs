pub mod cart;
pub mod errors;
pub mod events;
pub mod identity;
pub mod notice;
pub mod order;
pub mod ports;
pub mod product;
pub mod wishlist;
