//! Helpers for the plain `key=value` configuration files LND and bitcoind use.

use std::collections::HashMap;
use std::path::Path;

use crate::{Result, TestkitError};

/// Parse a section-less `key=value` config.
///
/// Blank lines and lines starting with `#` or `;` are skipped, keys and values
/// are trimmed and a later assignment overrides an earlier one. Section
/// headers (`[Application Options]`) are ignored so that full `lnd.conf` files
/// can be read as well.
pub fn parse_simple_config(text: &str) -> Result<HashMap<String, String>> {
    let mut config = HashMap::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            TestkitError::invalid_data("config", format!("line {}: expected key=value", number + 1))
        })?;
        config.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(config)
}

/// Read and parse a `key=value` config file.
pub fn parse_simple_config_file(path: &Path) -> Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| TestkitError::Io(format!("reading {}: {}", path.display(), e)))?;
    parse_simple_config(&text)
}

/// Port of a `host:port` pair.
pub fn port_from_host_port(host_port: &str) -> Result<u16> {
    let invalid = || {
        TestkitError::invalid_data(
            "host_port",
            format!("invalid input {}, should be host:port", host_port),
        )
    };

    let mut split = host_port.split(':');
    let (Some(_host), Some(port), None) = (split.next(), split.next(), split.next()) else {
        return Err(invalid());
    };
    port.parse().map_err(|_| invalid())
}

/// Port of a `scheme://host:port[/path]` URI.
pub fn port_from_uri(uri: &str) -> Result<u16> {
    let invalid = || {
        TestkitError::invalid_data(
            "uri",
            format!("invalid input {}, should be scheme://host:port", uri),
        )
    };

    let port = uri.split(':').nth(2).ok_or_else(invalid)?;
    let port = port.split('/').next().unwrap_or_default();
    port.parse().map_err(|_| invalid())
}
