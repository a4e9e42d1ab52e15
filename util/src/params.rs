//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::{fs::read_to_string, path::Path};
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot find the software root directory: {0}")]
    SwRootError(std::io::Error),

    #[error("Cannot load the parmeter file {0:?}: {1}")]
    FileLoadError(std::path::PathBuf, std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the `params` directory under the software root (see
/// [`crate::host::get_sw_root`]).
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    // Get the params dir
    let mut path = crate::host::get_sw_root()
        .map_err(|e| LoadError::SwRootError(e))?;
    path.push("params");
    path.push(param_file_path);

    load_from_path(path)
}

/// Load a parameter file from an explicit path.
pub fn load_from_path<P, Q>(path: Q) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    Q: AsRef<Path>
{
    // Load the file into a string
    let params_str = match read_to_string(path.as_ref()) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(path.as_ref().to_path_buf(), e))
    };

    from_str(&params_str)
}

/// Parse parameters from a TOML string.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    toml::from_str(params_str)
        .map_err(|e| LoadError::DeserialiseError(e))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestParams {
        heartbeat_timeout_s: f64,
        pool: Vec<String>
    }

    #[test]
    fn test_load_from_path() {
        let path = std::env::temp_dir()
            .join(format!("util_params_test_{}.toml", std::process::id()));
        std::fs::write(&path, "heartbeat_timeout_s = 1.5\npool = [\"a:1\", \"b:2\"]\n")
            .unwrap();

        let p: TestParams = load_from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(p, TestParams {
            heartbeat_timeout_s: 1.5,
            pool: vec!["a:1".into(), "b:2".into()]
        });
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            load_from_path::<TestParams, _>("/definitely/not/here.toml"),
            Err(LoadError::FileLoadError(..))
        ));
        assert!(matches!(
            from_str::<TestParams>("heartbeat_timeout_s = \"soon\""),
            Err(LoadError::DeserialiseError(_))
        ));
    }
}
