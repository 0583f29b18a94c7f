pub mod scan;
pub mod extract;
