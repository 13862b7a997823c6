pub mod perm_test;
pub mod randomize;
pub mod summary;
