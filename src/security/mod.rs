//! Input normalization and query validation.

pub mod normalizer;
pub mod validator;

pub use normalizer::{EncodingFinding, EncodingTechnique, InputNormalizer, NormalizedInput};
pub use validator::{GuardrailsValidator, RejectionKind, ValidationResult, extract_tables};
