// Ledgers
pub mod cart;
pub mod inventory;

// Checkout and payment confirmation
pub mod checkout;
pub mod payment_gateway;
pub mod reconciliation;

// Read-side services
pub mod orders;
pub mod promotions;
