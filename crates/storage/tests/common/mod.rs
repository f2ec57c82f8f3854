pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{collect, identity, temp_storage};
