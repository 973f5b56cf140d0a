pub mod errors;
pub mod mime;
