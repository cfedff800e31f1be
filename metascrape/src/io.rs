//! Draft batch input and output
//!
//! Drafts travel as a JSON array of camelCase records. A path of `-` means
//! stdin (input) or stdout (output).

use crate::types::Draft;
use metascrape_common::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

const STDIO: &str = "-";

/// Decode a batch; a single object is accepted as a batch of one
pub fn parse_drafts(content: &str) -> Result<Vec<Draft>> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| Error::InvalidInput(format!("Draft JSON: {}", e)))?;
    let value = match value {
        serde_json::Value::Object(_) => serde_json::Value::Array(vec![value]),
        other => other,
    };
    serde_json::from_value(value).map_err(|e| Error::InvalidInput(format!("Draft JSON: {}", e)))
}

/// Read a batch from `path`, or stdin for `-`
pub fn read_drafts(path: &Path) -> Result<Vec<Draft>> {
    let content = if path.as_os_str() == STDIO {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    parse_drafts(&content)
}

/// Write a batch as pretty JSON to `path`, or stdout for `-`
pub fn write_drafts(path: &Path, drafts: &[Draft]) -> Result<()> {
    let json = serde_json::to_string_pretty(drafts)
        .map_err(|e| Error::Internal(format!("Serialize drafts failed: {}", e)))?;
    if path.as_os_str() == STDIO {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    } else {
        std::fs::write(path, json + "\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PubType;
    use tempfile::TempDir;

    #[test]
    fn test_single_object_is_a_batch() {
        let drafts = parse_drafts(r#"{"title":"Attention Is All You Need","arxiv":"1706.03762"}"#).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].arxiv, "1706.03762");
    }

    #[test]
    fn test_invalid_json_is_input_error() {
        let err = parse_drafts("[{\"title\":").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_file_round_trip_keeps_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("drafts.json");
        let mut second = Draft::with_title("Second");
        second.pub_type = Some(PubType::Conference);
        let drafts = vec![Draft::with_title("First"), second];

        write_drafts(&path, &drafts).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"pubType\": 1"));

        assert_eq!(read_drafts(&path).unwrap(), drafts);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_drafts(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
