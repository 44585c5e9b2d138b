pub mod cart_service;
pub mod catalog_service;
pub mod checkout;
pub mod order_service;
pub mod price_approval;
pub mod wishlist_service;
