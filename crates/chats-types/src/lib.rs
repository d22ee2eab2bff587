pub mod api;
pub mod validate;

pub use validate::ValidationError;
