//! Compile-time registry of composite schemes.
//!
//! Each scheme is a TOML file under `schemes/` embedded via `include_str!`.
//! Operators can also point the server at their own scheme file with
//! [`load_scheme_file`].

use std::path::Path;

use heat_priority_index_models::CompositeScheme;

use crate::IndexError;

/// Id of the scheme used when none is configured.
pub const DEFAULT_SCHEME_ID: &str = "heat_vulnerability";

/// Number of registered schemes. Enforced by a test.
#[cfg(test)]
const EXPECTED_SCHEME_COUNT: usize = 2;

/// Embedded TOML scheme definitions.
const SCHEME_TOMLS: &[(&str, &str)] = &[
    (
        "heat_vulnerability",
        include_str!("../schemes/heat_vulnerability.toml"),
    ),
    (
        "heat_vulnerability_daytime",
        include_str!("../schemes/heat_vulnerability_daytime.toml"),
    ),
];

/// Returns all registered schemes.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse.
#[must_use]
pub fn all_schemes() -> Vec<CompositeScheme> {
    SCHEME_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse composite scheme '{name}': {e}"))
        })
        .collect()
}

/// Looks up a registered scheme by id.
///
/// # Errors
///
/// Returns [`IndexError::UnknownScheme`] if no scheme has that id.
pub fn scheme(id: &str) -> Result<CompositeScheme, IndexError> {
    all_schemes()
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| IndexError::UnknownScheme { id: id.to_string() })
}

/// The canonical heat vulnerability scheme.
///
/// # Panics
///
/// Panics if the default scheme is missing from the registry, which the
/// tests rule out.
#[must_use]
pub fn default_scheme() -> CompositeScheme {
    scheme(DEFAULT_SCHEME_ID)
        .unwrap_or_else(|e| panic!("Default composite scheme is not registered: {e}"))
}

/// Reads and validates an operator-supplied scheme file.
///
/// # Errors
///
/// Returns [`IndexError`] if the file cannot be read, is not valid scheme
/// TOML, or fails validation.
pub fn load_scheme_file(path: &Path) -> Result<CompositeScheme, IndexError> {
    let contents = std::fs::read_to_string(path)?;
    let scheme: CompositeScheme = toml::de::from_str(&contents)?;
    scheme.validate()?;
    log::info!(
        "Loaded composite scheme '{}' from {}",
        scheme.id,
        path.display()
    );
    Ok(scheme)
}
