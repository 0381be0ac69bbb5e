//! Core domain: the order aggregate, its validation and the error taxonomy

pub mod error;
pub mod order;
pub mod validation;

pub use error::{
    ConfigError, FieldValidationError, OrderError, OrderflowError, OrderflowResult, RequestError,
    StorageError, ValidationError,
};
pub use order::{Delivery, Item, Order, Payment, SUPPORTED_CURRENCIES};
pub use validation::OrderValidator;
