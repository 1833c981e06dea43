use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Read a JSON payload from stdin (invoked with `--input -`).
pub fn read_typed<T: DeserializeOwned>() -> Result<T, Box<dyn std::error::Error>> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Err("stdin was empty; pipe a JSON payload or pass flags instead".into());
    }

    let value: T = serde_json::from_str(trimmed)?;
    Ok(value)
}
