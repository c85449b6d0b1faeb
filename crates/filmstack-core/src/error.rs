//! Errors surfaced by the public operations of this crate.

use filmstack_materials::MaterialError;
use thiserror::Error;

use crate::oracle::OracleError;

#[derive(Debug, Error)]
pub enum CoatingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Evaluation failed at λ={wavelength_nm} nm: {source}")]
    Evaluation {
        wavelength_nm: f64,
        source: OracleError,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background evaluation ended without delivering a result")]
    Disconnected,

    #[error("Background evaluation panicked: {0}")]
    Panicked(String),
}

impl From<MaterialError> for CoatingError {
    fn from(err: MaterialError) -> Self {
        match err {
            MaterialError::NotFound { kind, name } => {
                CoatingError::NotFound(format!("{} '{}'", kind, name))
            }
            MaterialError::InvalidArgument(msg) => CoatingError::InvalidArgument(msg),
            MaterialError::Storage(msg) => CoatingError::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_errors_map_one_to_one() {
        let err: CoatingError = MaterialError::structure_not_found("AR").into();
        assert!(matches!(err, CoatingError::NotFound(ref m) if m == "Structure 'AR'"));
        let err: CoatingError = MaterialError::Storage("locked".into()).into();
        assert!(matches!(err, CoatingError::Storage(_)));
        let err: CoatingError = MaterialError::InvalidArgument("empty".into()).into();
        assert!(matches!(err, CoatingError::InvalidArgument(_)));
    }

    #[test]
    fn test_evaluation_error_names_wavelength() {
        let err = CoatingError::Evaluation {
            wavelength_nm: 632.8,
            source: OracleError::Numerical("singular".into()),
        };
        assert!(err.to_string().contains("632.8"));
    }
}
