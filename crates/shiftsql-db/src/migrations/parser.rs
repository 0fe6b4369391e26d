use std::path::Path;

use chrono::{DateTime, Utc};

use super::error::MigrationError;
use super::{Direction, MigrationFragment};

const SEPARATOR: char = '_';

/// Parse one migration file into the half of a migration it describes.
///
/// `path` only supplies the file name (and is kept for diagnostics); the
/// content has already been read by the caller.
pub fn parse_fragment(
    path: &Path,
    content: &str,
    modified: Option<DateTime<Utc>>,
) -> Result<MigrationFragment, MigrationError> {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (direction, base) = split_direction(&file).ok_or_else(|| {
        invalid_filename(&file, "migration file must end with .up.sql or .down.sql")
    })?;

    let (token, name) = base
        .split_once(SEPARATOR)
        .ok_or_else(|| invalid_filename(&file, "expected <version>_<name>"))?;

    if name.is_empty() {
        return Err(invalid_filename(&file, "migration name is empty"));
    }

    let version = parse_version(token).ok_or_else(|| MigrationError::InvalidVersion {
        file: file.clone(),
        token: token.to_string(),
    })?;

    Ok(MigrationFragment {
        version,
        name: name.to_string(),
        direction,
        script: content.trim().to_string(),
        path: path.to_path_buf(),
        modified,
    })
}

fn split_direction(file: &str) -> Option<(Direction, &str)> {
    [Direction::Up, Direction::Down]
        .into_iter()
        .find_map(|direction| {
            file.strip_suffix(direction.suffix())
                .map(|base| (direction, base))
        })
}

/// Digits only: signs, whitespace and empty tokens are rejected.
fn parse_version(token: &str) -> Option<i64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn invalid_filename(file: &str, reason: &str) -> MigrationError {
    MigrationError::InvalidFilename {
        file: file.to_string(),
        reason: reason.to_string(),
    }
}
