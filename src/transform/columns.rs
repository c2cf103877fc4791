use log::{debug, info};

use crate::{error::Result, frame::Frame};

/// Drops every listed column the table carries. Absent names are logged
/// and skipped. Returns the names actually removed.
pub fn drop_if_exist<S: AsRef<str>>(mut frame: Frame, names: &[S]) -> (Frame, Vec<String>) {
    let before = frame.column_count();
    let mut dropped = Vec::new();
    for name in names {
        let name = name.as_ref();
        if frame.drop_column(name).is_some() {
            dropped.push(name.to_string());
        } else {
            debug!("Column '{name}' not found; nothing to drop");
        }
    }
    if !dropped.is_empty() {
        info!(
            "Dropped {} column(s): {before} -> {}",
            dropped.len(),
            frame.column_count()
        );
    }
    (frame, dropped)
}

/// Applies each `(from, to)` rename whose source column exists.
pub fn rename_if_exist<S: AsRef<str>>(mut frame: Frame, renames: &[(S, S)]) -> Result<Frame> {
    for (from, to) in renames {
        let (from, to) = (from.as_ref(), to.as_ref());
        if frame.rename_column(from, to)? {
            debug!("Renamed '{from}' -> '{to}'");
        } else {
            debug!("Column '{from}' not found; nothing to rename");
        }
    }
    Ok(frame)
}
