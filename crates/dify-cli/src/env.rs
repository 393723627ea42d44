use std::path::{Path, PathBuf};

use dify_client::DifyError;

/// Loads `DIFY_*` settings from a dotenv file into the process environment.
///
/// An explicit `--env-file` must exist. Without one, the nearest `.env`
/// found from the working directory upwards is used if there is one.
/// Variables already set in the process are never overwritten.
pub fn load_dotenv(explicit: Option<&Path>) -> Result<Option<PathBuf>, DifyError> {
    match explicit {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                DifyError::Config(format!("failed to load env file {}: {e}", path.display()))
            })?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(DifyError::Config(format!("failed to load .env: {e}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn missing_explicit_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_dotenv(Some(&dir.path().join("absent.env"))).expect_err("missing");
        assert!(matches!(err, DifyError::Config(message) if message.contains("absent.env")));
    }

    #[test]
    fn explicit_file_is_loaded_without_overriding() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dify.env");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "DIFY_CLI_ENV_FILE_TEST=from-file").expect("write");
        drop(file);

        let loaded = load_dotenv(Some(&path)).expect("load");
        assert_eq!(loaded.as_deref(), Some(path.as_path()));
        assert_eq!(
            std::env::var("DIFY_CLI_ENV_FILE_TEST").as_deref(),
            Ok("from-file")
        );
    }
}
