use std::path::Path;

use serde::{Deserialize, Serialize};

use pharmassist_core::error::DataError;

use crate::loader::read_json;

/// A physician in the outreach list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub specialty: String,
}

/// Load the doctor list from a JSON array.
pub fn load_doctors(path: &Path) -> Result<Vec<Doctor>, DataError> {
    read_json(path, "doctor list")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_doctors_with_missing_fields() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(
            br#"[{"name": "Sarah Johnson", "specialty": "Cardiology"}, {"name": "Lee"}]"#,
        )
        .unwrap();
        let doctors = load_doctors(tmp.path()).unwrap();
        assert_eq!(doctors.len(), 2);
        assert_eq!(doctors[0].specialty, "Cardiology");
        assert_eq!(doctors[1].specialty, "");
    }
}
