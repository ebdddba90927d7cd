// Copyright 2023 Remi Bernotavicius

use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum DecodeError {
    Io { path: PathBuf, error: std::io::Error },
    Json { path: PathBuf, error: serde_json::Error },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, error } => write!(f, "decode error: reading {path:?}: {error}"),
            Self::Json { path, error } => write!(f, "decode error: parsing {path:?}: {error}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Reads a JSON array of `T` records from `path`.
pub fn decode_records_from_path<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Vec<T>, DecodeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|error| DecodeError::Io {
        path: path.into(),
        error,
    })?;
    serde_json::from_slice(&bytes).map_err(|error| DecodeError::Json {
        path: path.into(),
        error,
    })
}

#[test]
fn decode_ingredients() {
    use crate::catalog::NewIngredient;
    use std::io::Write as _;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"name": "abricot", "measurement_unit": "g"}}, {{"name": "salt", "measurement_unit": "pinch"}}]"#
    )
    .unwrap();

    let records: Vec<NewIngredient> = decode_records_from_path(file.path()).unwrap();
    assert_eq!(
        records,
        vec![
            NewIngredient {
                name: "abricot".into(),
                measurement_unit: "g".into()
            },
            NewIngredient {
                name: "salt".into(),
                measurement_unit: "pinch".into()
            },
        ]
    );
}

#[test]
fn decode_errors_name_the_file() {
    use crate::catalog::NewTag;
    use std::io::Write as _;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{not json").unwrap();
    let err = decode_records_from_path::<NewTag>(file.path()).unwrap_err();
    assert!(matches!(err, DecodeError::Json { .. }));
    assert!(err.to_string().contains("parsing"));

    let err = decode_records_from_path::<NewTag>("/definitely/not/here.json").unwrap_err();
    assert!(matches!(err, DecodeError::Io { .. }));
}
