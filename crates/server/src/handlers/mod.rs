//! HTTP request handlers.

pub mod common;
pub mod content;
pub mod index;
pub mod publish;
pub mod registration;
pub mod search;

pub use content::*;
pub use index::*;
pub use publish::*;
pub use registration::*;
pub use search::*;
