//! Export the TI index to CSV.
//!
//! Downstream tools name and sort the synthetic volumes by TI; the index is the
//! one place that maps sweep position to TI and file.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::AppError;
use crate::io::manifest::TiEntry;

pub const TI_INDEX_FILE: &str = "ti_index.csv";

/// File name for a synthetic volume, zero-padded on TI so names sort by TI.
pub fn synth_file_name(prefix: &str, ti: f64) -> String {
    if ti.fract() == 0.0 {
        format!("{prefix}_TI-{:05}.nii.gz", ti as i64)
    } else {
        format!("{prefix}_TI-{:08.2}.nii.gz", ti)
    }
}

/// Write `k,ti_ms,file` rows.
pub fn write_ti_index_csv(path: &Path, entries: &[TiEntry]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create TI index '{}': {e}", path.display())))?;

    writeln!(file, "k,ti_ms,file").map_err(|e| AppError::io(format!("Failed to write TI index header: {e}")))?;
    for entry in entries {
        writeln!(file, "{},{},{}", entry.k, entry.ti_ms, entry.file.display())
            .map_err(|e| AppError::io(format!("Failed to write TI index row: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_sort_by_ti() {
        assert_eq!(synth_file_name("synth", 400.0), "synth_TI-00400.nii.gz");
        assert_eq!(synth_file_name("synth", 1400.0), "synth_TI-01400.nii.gz");
        assert!(synth_file_name("synth", 980.0) < synth_file_name("synth", 1000.0));
        assert_eq!(synth_file_name("s", 412.5), "s_TI-00412.50.nii.gz");
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TI_INDEX_FILE);
        let entries = vec![
            TiEntry {
                k: 0,
                ti_ms: 400.0,
                file: "synth_TI-00400.nii.gz".into(),
            },
            TiEntry {
                k: 1,
                ti_ms: 420.0,
                file: "synth_TI-00420.nii.gz".into(),
            },
        ];
        write_ti_index_csv(&path, &entries).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "k,ti_ms,file");
        assert_eq!(lines[2], "1,420,synth_TI-00420.nii.gz");
    }
}
