pub mod numeric;
pub mod rayon;
