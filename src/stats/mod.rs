pub mod fit;
pub mod linalg;
pub mod vec;
