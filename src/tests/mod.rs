// Test modules for ShelfDB





#[cfg(test)]
pub mod write_buffer_tests;

#[cfg(test)]
pub mod hash_db_tests;

#[cfg(test)]
pub mod persistence_tests;



#[cfg(test)]
pub mod cursor_tests;

#[cfg(test)]
pub mod transaction_tests;

#[cfg(test)]
pub mod fixed_tests;
