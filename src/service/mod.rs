//! CrudService: generic CRUD using the safe SQL builder, plus request decoding and validation.

mod crud;
pub mod transfer;
mod validation;
pub use crud::CrudService;
pub use transfer::{decode_write, WriteMode};
pub use validation::{validate_field, RequestValidator};
