pub mod fetch;
pub mod probe;
pub mod search;
