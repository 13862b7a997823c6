pub mod filter;
pub mod validation;
