//! Core types for sift.

mod article;
mod category;
mod records;
mod region;

pub use article::Article;
pub use category::{Category, Sport};
pub use records::*;
pub use region::Region;
