//! Security identifier resolution port.

use std::collections::HashMap;

use crate::domain::error::ImportError;

/// Maps opaque security codes (CUSIPs) to ticker symbols.
///
/// Called once per import with every distinct code in the file. Codes missing
/// from the returned map are unresolved; the import keeps the raw code as the
/// symbol and reports it back to the caller.
pub trait IdentifierPort {
    fn resolve(
        &self,
        codes: &[String],
        user_id: Option<&str>,
    ) -> Result<HashMap<String, String>, ImportError>;
}
