use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

/// Lines the compiler stamps with run-specific identity.
pub const DEFAULT_PATTERNS: &[&str] = &[r"^; ModuleID = .*$", r"^source_filename = .*$"];

/// Strips volatile lines from generated output before it is diffed.
#[derive(Debug, Clone)]
pub struct Normalizer {
    patterns: Vec<Regex>,
}

impl Default for Normalizer {
    fn default() -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Normalizer { patterns }
    }
}

impl Normalizer {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> std::result::Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Normalizer { patterns })
    }

    /// Drops every line matched by a pattern, trims trailing whitespace, and
    /// terminates the text with a single newline.
    pub fn normalize_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let body = line.strip_suffix('\n').unwrap_or(line);
            if self.patterns.iter().any(|re| re.is_match(body)) {
                continue;
            }
            out.push_str(line);
        }
        let keep = out.trim_end().len();
        out.truncate(keep);
        out.push('\n');
        out
    }

    /// Rewrites `path` in place. Returns whether the contents changed.
    pub fn normalize_file(&self, path: &Path) -> Result<bool> {
        let raw = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let text = String::from_utf8_lossy(&raw);
        let normalized = self.normalize_text(&text);
        if normalized.as_bytes() == raw.as_slice() {
            return Ok(false);
        }
        std::fs::write(path, normalized.as_bytes()).map_err(|e| Error::io(path, e))?;
        tracing::debug!(path = %path.display(), "normalized generated output");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_module_header_and_source_filename() {
        let n = Normalizer::default();
        let raw = "; ModuleID = 'add.syp'\nsource_filename = \"add.syp\"\n\nadd i32 %a, %b\n\n\n";
        assert_eq!(n.normalize_text(raw), "\nadd i32 %a, %b\n");
    }

    #[test]
    fn ensures_single_trailing_newline() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_text("ret void"), "ret void\n");
        assert_eq!(n.normalize_text("ret void  \t\n\n"), "ret void\n");
        assert_eq!(n.normalize_text(""), "\n");
    }

    #[test]
    fn normalization_is_idempotent() {
        let n = Normalizer::default();
        for raw in [
            "; ModuleID = 'x'\ndefine i32 @main() {\n  ret i32 0\n}\n  \n",
            "no header\r\nsecond line\r\n",
            "\n\n",
        ] {
            let once = n.normalize_text(raw);
            assert_eq!(n.normalize_text(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn default_patterns_all_compile() {
        let n = Normalizer::new(DEFAULT_PATTERNS).unwrap();
        assert_eq!(n.patterns.len(), DEFAULT_PATTERNS.len());
        assert_eq!(Normalizer::default().patterns.len(), DEFAULT_PATTERNS.len());
    }

    #[test]
    fn header_text_inside_a_line_is_kept() {
        let n = Normalizer::default();
        let raw = "  ; ModuleID = 'indented'\n";
        assert_eq!(n.normalize_text(raw), raw);
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let n = Normalizer::new(&["^!llvm.ident = .*$"]).unwrap();
        let raw = "; ModuleID = 'kept'\n!llvm.ident = !{!0}\n";
        assert_eq!(n.normalize_text(raw), "; ModuleID = 'kept'\n");
        assert!(Normalizer::new(&["("]).is_err());
    }

    #[test]
    fn normalize_file_reports_change_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("add.ll");
        std::fs::write(&path, "; ModuleID = 'add'\nadd i32 %a, %b").unwrap();

        let n = Normalizer::default();
        assert!(n.normalize_file(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "add i32 %a, %b\n");
        assert!(!n.normalize_file(&path).unwrap());
    }
}
