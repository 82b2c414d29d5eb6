pub mod cart;
pub mod customer;
pub mod conversation;
pub mod discount;
pub mod product;
pub mod segment;
