//! Address string validation: `scheme://suffix`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is missing a scheme separator")]
    MissingScheme,
    #[error("scheme contains characters other than alphanumerics and '+'")]
    InvalidSchemeChars,
    #[error("suffix is empty")]
    EmptySuffix,
}

/// Split and validate an address string of the form `scheme://suffix`.
///
/// The scheme (a communicator tag) must be alphanumeric-plus-`+`; the
/// suffix (communicator-specific) must be non-empty.
pub fn validate_address(address: &str) -> Result<(&str, &str), AddressError> {
    let (scheme, suffix) = address
        .split_once("://")
        .ok_or(AddressError::MissingScheme)?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return Err(AddressError::InvalidSchemeChars);
    }
    if suffix.is_empty() {
        return Err(AddressError::EmptySuffix);
    }
    Ok((scheme, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_address() {
        assert_eq!(validate_address("tcp://1.2.3.4:80"), Ok(("tcp", "1.2.3.4:80")));
    }

    #[test]
    fn accepts_plus_in_scheme() {
        assert!(validate_address("quic+v1://1.2.3.4:80").is_ok());
    }

    #[test]
    fn rejects_missing_scheme_separator() {
        assert_eq!(validate_address("nota-valid-address"), Err(AddressError::MissingScheme));
    }

    #[test]
    fn rejects_non_alpha_scheme() {
        assert_eq!(validate_address("tc p://x"), Err(AddressError::InvalidSchemeChars));
    }

    #[test]
    fn rejects_empty_suffix() {
        assert_eq!(validate_address("tcp://"), Err(AddressError::EmptySuffix));
    }
}
