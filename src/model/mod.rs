pub mod cwm;
pub mod error;
pub mod matrix;
pub mod method;
pub mod outcome;
pub mod params;
pub mod table;
pub mod types;
