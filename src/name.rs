//! Interface name validation and negotiation
//!
//! The kernel is authoritative for the final interface name. This module
//! validates caller-supplied names against the platform bound before any
//! system call is made, and reconciles them with the name the kernel
//! actually assigned.

use crate::error::{IfaceError, Result};
use std::fmt;

/// Maximum interface name length, excluding the trailing NUL (IFNAMSIZ - 1)
pub const MAX_NAME_LEN: usize = 15;

/// A validated interface name: non-empty, within the platform length
/// bound, and free of disallowed characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Validate a caller-supplied name.
    ///
    /// Rejects names that are empty, exceed [`MAX_NAME_LEN`], or contain
    /// NUL, `/`, whitespace, or control characters. Callers that want the
    /// kernel to pick a name should use [`validate_preferred`] instead.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(IfaceError::InvalidName(
                "interface name cannot be empty".to_string(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(IfaceError::InvalidName(format!(
                "{name:?} exceeds the {MAX_NAME_LEN}-character limit"
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| *c == '\0' || *c == '/' || c.is_whitespace() || c.is_control())
        {
            return Err(IfaceError::InvalidName(format!(
                "{name:?} contains disallowed character {c:?}"
            )));
        }

        Ok(Self(name.to_string()))
    }

    /// Borrow the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate an optional preferred name. Empty input is valid and means
/// "let the kernel assign".
pub fn validate_preferred(preferred: &str) -> Result<Option<InterfaceName>> {
    if preferred.is_empty() {
        return Ok(None);
    }
    InterfaceName::new(preferred).map(Some)
}

/// Reconcile the requested name with the name the kernel assigned.
///
/// If a name was requested, the kernel must have honored it exactly; a
/// mismatch indicates an unexpected rename and is surfaced as an error
/// rather than silently accepted. With no requested name, the kernel's
/// choice is accepted verbatim (it must still be well-formed).
pub fn reconcile(
    requested: Option<&InterfaceName>,
    kernel_assigned: &str,
) -> Result<InterfaceName> {
    let assigned = InterfaceName::new(kernel_assigned)?;
    match requested {
        Some(requested) if requested != &assigned => Err(IfaceError::UnexpectedRename {
            requested: requested.as_str().to_string(),
            assigned: assigned.as_str().to_string(),
        }),
        _ => Ok(assigned),
    }
}
