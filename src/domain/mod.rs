pub mod commission;
pub mod errors;
pub mod order;
pub mod payment;
pub mod ports;
pub mod secret;
pub mod stock;
pub mod wallet;
