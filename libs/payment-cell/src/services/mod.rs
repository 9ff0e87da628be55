pub mod checkout;
pub mod gateway;
