pub mod adapter;
pub mod btree;
pub mod cache;
pub mod fixed;
pub mod hash;
pub mod options;
