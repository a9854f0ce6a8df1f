//! Result type alias for Tablift

use super::errors::TabliftError;

/// Result type alias for Tablift operations
///
/// # Examples
///
/// ```
/// use tablift::domain::result::Result;
/// use tablift::domain::errors::TabliftError;
///
/// fn failing_function() -> Result<()> {
///     Err(TabliftError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, TabliftError>;
