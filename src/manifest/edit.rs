use std::io::Write;
use std::path::Path;

/// Prefix the given 0-based lines with `marker`, preserving line endings
pub fn disable_lines(contents: &str, lines: &[usize], marker: &str) -> String {
    let mut out = String::with_capacity(contents.len() + lines.len() * marker.len());
    for (idx, line) in contents.split_inclusive('\n').enumerate() {
        if lines.contains(&idx) {
            out.push_str(marker);
        }
        out.push_str(line);
    }
    out
}

/// Strip exactly one `marker` prefix from the given 0-based lines
pub fn enable_lines(contents: &str, lines: &[usize], marker: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for (idx, line) in contents.split_inclusive('\n').enumerate() {
        match line.strip_prefix(marker) {
            Some(original) if lines.contains(&idx) => out.push_str(original),
            _ => out.push_str(line),
        }
    }
    out
}

/// Write through a sibling temp file and rename over `path`
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    if let Ok(metadata) = std::fs::metadata(path) {
        // Keep the original mode; failure here is not worth aborting the write
        let _ = std::fs::set_permissions(tmp.path(), metadata.permissions());
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
