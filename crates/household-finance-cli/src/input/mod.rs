pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Read a typed payload from a JSON/YAML file, or from stdin when the
/// path is "-".
pub fn read_payload<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    if path.trim() == "-" {
        stdin::read_typed()
    } else {
        file::read_typed(path)
    }
}
