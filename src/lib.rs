pub mod container;
pub mod domain;
pub mod error;
pub mod infrastructure;
