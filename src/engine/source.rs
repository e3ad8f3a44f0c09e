//! Input acquisition: where physical lines come from.
//!
//! The engine reads either from a path it owns (opened fresh on every read,
//! validated, closed when the read ends) or from a caller-owned buffered
//! reader (borrowed for one read, handed back afterwards, never closed
//! here). In both cases lines are delivered *with* their terminator so that
//! chomp is meaningful.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// One read's worth of input.
pub(crate) enum Source {
    /// Opened from a configured filename; dropped (closed) after the read.
    File(BufReader<File>),
    /// Caller-owned handle; returned to the engine's slot after the read.
    Handle(Box<dyn BufRead + Send>),
}

impl Source {
    /// Next physical line, terminator included. `None` at EOF.
    pub fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let reader: &mut dyn BufRead = match self {
            Source::File(r) => r,
            Source::Handle(r) => &mut **r,
        };
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 { Ok(None) } else { Ok(Some(line)) }
    }
}

/// How much of the file the plain-text sniff looks at.
const SNIFF_LEN: usize = 1024;

/// Open `path` and verify it is a readable plain-text file. The check is
/// the classic heuristic: a NUL byte in the leading block marks the file
/// binary.
pub(crate) fn open_validated(path: &Path) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(Error::FileNotFound { path: path.to_path_buf() });
    }
    let file = File::open(path).map_err(|source| Error::FileUnreadable { path: path.to_path_buf(), source })?;
    let mut reader = BufReader::new(file);

    let mut head = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = reader
            .read(&mut head[filled..])
            .map_err(|source| Error::FileUnreadable { path: path.to_path_buf(), source })?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if head[..filled].contains(&0) {
        return Err(Error::NotPlainText { path: path.to_path_buf() });
    }

    // Reopen so the read starts from the top; the sniff consumed the head.
    let file = File::open(path).map_err(|source| Error::FileUnreadable { path: path.to_path_buf(), source })?;
    Ok(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("textrules-source-{}-{name}", std::process::id()));
        p
    }

    #[test]
    fn missing_file_is_reported() {
        let err = open_validated(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn nul_bytes_mark_a_file_binary() {
        let path = temp_path("binary");
        std::fs::File::create(&path).unwrap().write_all(b"abc\0def").unwrap();
        let err = open_validated(&path).unwrap_err();
        assert!(matches!(err, Error::NotPlainText { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn lines_keep_their_terminators() {
        let path = temp_path("lines");
        std::fs::File::create(&path).unwrap().write_all(b"one\ntwo").unwrap();
        let mut source = Source::File(open_validated(&path).unwrap());
        assert_eq!(source.next_line().unwrap(), Some("one\n".to_string()));
        assert_eq!(source.next_line().unwrap(), Some("two".to_string()));
        assert_eq!(source.next_line().unwrap(), None);
        std::fs::remove_file(&path).ok();
    }
}
