pub mod api_errors;
pub mod callbacks;
pub mod checkout;
pub mod credits;
pub mod gateway;
