//! Minimal file helpers for persisting run artifacts.

use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes `lines` to `base_dir/label_run<index>.txt`, creating the directory.
pub fn write_run_lines(
    base_dir: impl AsRef<Path>,
    label: &str,
    index: usize,
    lines: &[String],
) -> io::Result<PathBuf> {
    let dir = base_dir.as_ref();
    create_dir_all(dir)?;
    let path = dir.join(format!("{label}_run{index:03}.txt"));
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::write_run_lines;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_write_run_lines() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let tmp_dir = std::env::temp_dir().join(format!("ghz_accord_test_{unique}"));
        let lines = vec!["round:0 kind:value".to_string(), "digest:00".to_string()];
        let path = write_run_lines(&tmp_dir, "ideal", 7, &lines).unwrap();
        assert!(path.ends_with(PathBuf::from("ideal_run007.txt")));
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "round:0 kind:value\ndigest:00\n");
        fs::remove_dir_all(&tmp_dir).unwrap();
    }
}
