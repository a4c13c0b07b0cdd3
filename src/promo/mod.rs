// ============================================================================
// Promo Validation - quorum vote over authoritative code lists
// ============================================================================

mod source;
mod validator;

pub use source::{FileSource, ListSource, PromoSource, SourceError};
pub use validator::{PromoError, PromoValidator, CODE_LENGTH};
