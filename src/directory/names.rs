//! Naming grammar for DNS-SD style service types, instance names, and TXT
//! parameter strings.

use crate::error::Error;
use std::collections::HashMap;

/// Per RFC 6763 §6: each `key=value` string is limited to 255 bytes and the
/// whole string section, length prefixes included, to 1300 bytes. Keys are
/// printable ASCII without `=`, at most nine bytes.
const MAX_TXT_STRING: usize = 255;
const MAX_TXT_SECTION: usize = 1300;
const MAX_TXT_KEY: usize = 9;

/// A character usable inside service labels: Unicode letters, Unicode
/// digits, and `_`.
fn is_name_allowed(c: char) -> bool {
    c.is_alphabetic() || c.is_numeric() || c == '_'
}

fn first_disallowed(s: &str) -> Option<char> {
    s.chars().find(|c| !is_name_allowed(*c))
}

/// Validate a service type such as `_http._tcp`: every dot-separated label
/// is non-empty, made of name-allowed characters, and starts with `_`. A
/// trailing dot is stripped before splitting.
pub fn validate_service_type(service_type: &str) -> Result<(), Error> {
    let stripped = service_type.strip_suffix('.').unwrap_or(service_type);
    if stripped.is_empty() {
        return Err(Error::WrongSrvType("service type is empty".to_string()));
    }
    for label in stripped.split('.') {
        if let Some(c) = first_disallowed(label) {
            return Err(Error::WrongSrvType(format!(
                "service type contains not allowed character '{c}'"
            )));
        }
        if !label.starts_with('_') {
            return Err(Error::WrongSrvType(
                "service type labels must start with '_'".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate a service instance name such as `svc1._http._tcp`: the name
/// does not start with `_`, labels are made of name-allowed characters, and
/// every label after the first starts with `_`. A trailing dot is stripped
/// before splitting.
pub fn validate_service_name(name: &str) -> Result<(), Error> {
    let stripped = name.strip_suffix('.').unwrap_or(name);
    if stripped.is_empty() {
        return Err(Error::WrongSrvName("service name is empty".to_string()));
    }
    if stripped.starts_with('_') {
        return Err(Error::WrongSrvName(
            "service name must not start with '_'".to_string(),
        ));
    }
    for (i, label) in stripped.split('.').enumerate() {
        if label.is_empty() {
            return Err(Error::WrongSrvName(
                "service name contains an empty label".to_string(),
            ));
        }
        if let Some(c) = first_disallowed(label) {
            return Err(Error::WrongSrvName(format!(
                "service name contains not allowed character '{c}'"
            )));
        }
        if i > 0 && !label.starts_with('_') {
            return Err(Error::WrongSrvName(
                "middle service name labels must start with '_'".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate the instance-specific prefix left over after stripping the
/// service type from a full name: non-empty, name-allowed characters only,
/// not starting with `_`.
pub fn validate_name_prefix(prefix: &str) -> Result<(), Error> {
    if prefix.is_empty() {
        return Err(Error::WrongSrvName(
            "service name coincides with its service type".to_string(),
        ));
    }
    if let Some(c) = first_disallowed(prefix) {
        return Err(Error::WrongSrvName(format!(
            "starting part of a service name contains not allowed character '{c}'"
        )));
    }
    if prefix.starts_with('_') {
        return Err(Error::WrongSrvName(
            "service name must not start with '_'".to_string(),
        ));
    }
    Ok(())
}

fn validate_txt_key(key: &str) -> Result<(), Error> {
    if key.is_empty() || key.len() > MAX_TXT_KEY {
        return Err(Error::WrongTxtString(
            "TXT key must have length between 1 and 9".to_string(),
        ));
    }
    if key.bytes().any(|b| !(0x20..=0x7e).contains(&b) || b == b'=') {
        return Err(Error::WrongTxtString(
            "TXT key contains a not allowed character".to_string(),
        ));
    }
    Ok(())
}

/// Count the value bytes as they land on the wire: a `\DDD` escape collapses
/// to one byte, any other `\X` pair to one byte, everything else passes
/// through.
fn encoded_value_len(value: &str) -> usize {
    let bytes = value.as_bytes();
    let mut i = 0;
    let mut len = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 1;
            if i + 2 < bytes.len()
                && bytes[i].is_ascii_digit()
                && bytes[i + 1].is_ascii_digit()
                && bytes[i + 2].is_ascii_digit()
            {
                i += 2;
            }
        }
        i += 1;
        len += 1;
    }
    len
}

/// Build the TXT strings for a parameter map: `txtvers` first when present,
/// the rest in map order, every string within the DNS-SD sizing limits.
pub fn encode_txt_params(params: &HashMap<String, String>) -> Result<Vec<String>, Error> {
    let mut strings = Vec::with_capacity(params.len());
    let mut section_len = 0;
    for (key, value) in params {
        validate_txt_key(key)?;

        let string_len = encoded_value_len(value) + key.len() + 1;
        if string_len > MAX_TXT_STRING {
            return Err(Error::WrongTxtString(
                "TXT string exceeded 255 bytes".to_string(),
            ));
        }
        // One length-prefix byte per string counts against the section.
        section_len += string_len + 1;
        if section_len > MAX_TXT_SECTION {
            return Err(Error::WrongTxtString(
                "string section of a TXT resource record exceeded 1300 bytes".to_string(),
            ));
        }

        let encoded = format!("{key}={value}");
        if key == "txtvers" {
            strings.insert(0, encoded);
        } else {
            strings.push(encoded);
        }
    }
    Ok(strings)
}
