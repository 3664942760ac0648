use adcp_api::AttributeId;
use thiserror::Error;

/// Errors raised while updating the cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The device answered with something the attribute cannot hold
    ///
    /// The previously cached value is left untouched.
    #[error("Unparseable value for {attribute}: {raw}")]
    UnparseableValue { attribute: AttributeId, raw: String },
}

pub type Result<T> = std::result::Result<T, StateError>;
