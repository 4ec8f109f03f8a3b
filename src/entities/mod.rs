pub mod cart_line;
pub mod game;
pub mod order;
pub mod order_item;
pub mod payment_card;
pub mod promo_code;
