use std::io::{Cursor, Read};
use std::path::{Component, Path};

use crate::config::ArchiveConfig;
use crate::error::ValidationError;

use super::project::ExtractedProject;

/// Directory names whose contents are never part of a project.
const NOISE_DIRS: &[&str] = &["__MACOSX", ".git", "__pycache__", "node_modules", ".venv"];

/// File names dropped wherever they appear.
const NOISE_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Metadata gathered in the validation pass, before any content is read.
struct EntryInfo {
    index: usize,
    path: String,
}

/// Unpacks uploaded `.zip` archives into an [`ExtractedProject`].
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    limits: ArchiveConfig,
}

impl ArchiveExtractor {
    pub fn new(limits: ArchiveConfig) -> Self {
        Self { limits }
    }

    /// Validates and expands an archive.
    ///
    /// All entry names are checked before any entry content is read, so a
    /// traversal entry anywhere in the archive rejects the whole upload.
    pub fn extract(&self, filename: &str, bytes: &[u8]) -> Result<ExtractedProject, ValidationError> {
        check_extension(filename)?;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ValidationError::MalformedArchive(e.to_string()))?;

        if archive.is_empty() {
            return Err(ValidationError::EmptyArchive);
        }
        if archive.len() > self.limits.max_entries {
            return Err(ValidationError::ArchiveTooLarge(format!(
                "{} entries (max {})",
                archive.len(),
                self.limits.max_entries
            )));
        }

        tracing::debug!(
            archive = %crate::sanitize::redact_path(std::path::Path::new(filename)),
            entries = archive.len(),
            "Extracting archive"
        );

        let entries = self.validate_entries(&mut archive)?;
        if entries.is_empty() {
            return Err(ValidationError::EmptyArchive);
        }

        let root = common_root(&entries);
        let mut project = ExtractedProject::default();
        let mut total: u64 = 0;

        for entry in &entries {
            let mut file = archive
                .by_index(entry.index)
                .map_err(|e| ValidationError::MalformedArchive(e.to_string()))?;

            let mut buf = Vec::new();
            (&mut file)
                .take(self.limits.max_file_bytes + 1)
                .read_to_end(&mut buf)
                .map_err(|e| ValidationError::MalformedArchive(format!("{}: {}", entry.path, e)))?;

            if buf.len() as u64 > self.limits.max_file_bytes {
                return Err(ValidationError::ArchiveTooLarge(format!(
                    "'{}' exceeds {} bytes",
                    entry.path, self.limits.max_file_bytes
                )));
            }
            total += buf.len() as u64;
            if total > self.limits.max_total_bytes {
                return Err(ValidationError::ArchiveTooLarge(format!(
                    "uncompressed size exceeds {} bytes",
                    self.limits.max_total_bytes
                )));
            }

            let path = match root {
                Some(root) => entry.path[root.len() + 1..].to_string(),
                None => entry.path.clone(),
            };

            project.project_structure.push(path.clone());
            match String::from_utf8(buf) {
                Ok(text) => {
                    if let Some(rest) = subtree_path(&path, "templates") {
                        project.templates.insert(rest, text.clone());
                    } else if let Some(rest) = subtree_path(&path, "static") {
                        project.static_assets.insert(rest, text.clone());
                    }
                    project.files.insert(path, text);
                }
                Err(_) => project.binary_files.push(path),
            }
        }

        log::debug!(
            "Extracted {} files ({} binary, {} bytes)",
            project.project_structure.len(),
            project.binary_files.len(),
            total
        );

        Ok(project)
    }

    /// First pass: name checks and declared-size limits only.
    fn validate_entries<R: Read + std::io::Seek>(
        &self,
        archive: &mut zip::ZipArchive<R>,
    ) -> Result<Vec<EntryInfo>, ValidationError> {
        let mut entries = Vec::new();
        let mut declared_total: u64 = 0;

        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| ValidationError::MalformedArchive(e.to_string()))?;

            let raw_name = file.name().to_string();
            let path = normalize_entry_name(&raw_name)
                .ok_or_else(|| ValidationError::PathTraversal(raw_name.clone()))?;
            if file.enclosed_name().is_none() {
                return Err(ValidationError::PathTraversal(raw_name));
            }

            if file.is_dir() || path.is_empty() || is_noise(&path) {
                continue;
            }

            if file.size() > self.limits.max_file_bytes {
                return Err(ValidationError::ArchiveTooLarge(format!(
                    "'{}' exceeds {} bytes",
                    path, self.limits.max_file_bytes
                )));
            }
            declared_total = declared_total.saturating_add(file.size());
            if declared_total > self.limits.max_total_bytes {
                return Err(ValidationError::ArchiveTooLarge(format!(
                    "uncompressed size exceeds {} bytes",
                    self.limits.max_total_bytes
                )));
            }

            entries.push(EntryInfo { index, path });
        }

        Ok(entries)
    }
}

fn check_extension(filename: &str) -> Result<(), ValidationError> {
    let is_zip = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    if is_zip {
        Ok(())
    } else {
        Err(ValidationError::DisallowedArchiveType(filename.to_string()))
    }
}

/// Normalizes an entry name to a relative `/`-separated path.
///
/// Returns `None` for absolute paths, drive prefixes and any `..` component.
fn normalize_entry_name(name: &str) -> Option<String> {
    let unified = name.replace('\\', "/");
    if unified.starts_with('/') || unified.contains('\0') {
        return None;
    }
    if unified.len() >= 2 && unified.as_bytes()[1] == b':' {
        return None;
    }

    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}

fn is_noise(path: &str) -> bool {
    let mut segments = path.split('/').peekable();
    while let Some(segment) = segments.next() {
        let is_last = segments.peek().is_none();
        if is_last {
            return NOISE_FILES.contains(&segment) || segment.starts_with("._");
        }
        if NOISE_DIRS.contains(&segment) {
            return true;
        }
    }
    false
}

/// The single top-level directory shared by every entry, if there is one.
fn common_root(entries: &[EntryInfo]) -> Option<&str> {
    let first = entries.first()?.path.split_once('/')?.0;
    entries
        .iter()
        .all(|e| matches!(e.path.split_once('/'), Some((root, rest)) if root == first && !rest.is_empty()))
        .then_some(first)
}

/// Path below the first `name/` directory segment, if any.
fn subtree_path<'a>(path: &'a str, name: &str) -> Option<&'a str> {
    let mut offset = 0;
    for segment in path.split('/') {
        let next = offset + segment.len() + 1;
        if segment == name && next < path.len() {
            return Some(&path[next..]);
        }
        offset = next;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn flask_zip() -> Vec<u8> {
        build_zip(&[
            ("shop/app.py", b"from flask import Flask\napp = Flask(__name__)\n"),
            ("shop/routes.py", b"@app.route('/')\ndef index(): pass\n"),
            ("shop/templates/base.html", b"<html></html>"),
            ("shop/templates/auth/login.html", b"<form></form>"),
            ("shop/static/css/site.css", b"body {}"),
            ("shop/static/img/logo.png", &[0x89, 0x50, 0x4e, 0x47, 0xff, 0xfe]),
            ("shop/__pycache__/app.cpython-311.pyc", b"junk"),
            ("__MACOSX/shop/._app.py", b"junk"),
        ])
    }

    #[test]
    fn test_extract_flask_project() {
        let extractor = ArchiveExtractor::default();
        let project = extractor.extract("shop.zip", &flask_zip()).unwrap();

        assert_eq!(
            project.project_structure,
            vec![
                "app.py",
                "routes.py",
                "templates/base.html",
                "templates/auth/login.html",
                "static/css/site.css",
                "static/img/logo.png",
            ]
        );
        assert!(project.file("app.py").unwrap().contains("Flask"));
        assert_eq!(project.templates.get("auth/login.html"), Some("<form></form>"));
        assert_eq!(project.static_assets.get("css/site.css"), Some("body {}"));
        assert_eq!(project.binary_files, vec!["static/img/logo.png"]);
        assert!(project.file("static/img/logo.png").is_none());
    }

    #[test]
    fn test_extract_is_idempotent() {
        let extractor = ArchiveExtractor::default();
        let bytes = flask_zip();
        let first = extractor.extract("shop.zip", &bytes).unwrap();
        let second = extractor.extract("shop.zip", &bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_common_root_keeps_paths() {
        let bytes = build_zip(&[("app.py", b"x"), ("pkg/routes.py", b"y")]);
        let project = ArchiveExtractor::default().extract("p.zip", &bytes).unwrap();
        assert_eq!(project.project_structure, vec!["app.py", "pkg/routes.py"]);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let bytes = build_zip(&[("app.py", b"ok"), ("../../etc/passwd", b"root:x:0:0")]);
        let err = ArchiveExtractor::default().extract("evil.zip", &bytes).unwrap_err();
        assert_eq!(err, ValidationError::PathTraversal("../../etc/passwd".to_string()));
    }

    #[test]
    fn test_rejects_absolute_entry() {
        let bytes = build_zip(&[("/etc/passwd", b"root")]);
        let err = ArchiveExtractor::default().extract("evil.zip", &bytes).unwrap_err();
        assert!(matches!(err, ValidationError::PathTraversal(_)));
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let err = ArchiveExtractor::default()
            .extract("project.tar.gz", &flask_zip())
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::DisallowedArchiveType("project.tar.gz".to_string())
        );
    }

    #[test]
    fn test_accepts_uppercase_extension() {
        assert!(ArchiveExtractor::default()
            .extract("PROJECT.ZIP", &flask_zip())
            .is_ok());
    }

    #[test]
    fn test_rejects_empty_archive() {
        let bytes = build_zip(&[]);
        let err = ArchiveExtractor::default().extract("empty.zip", &bytes).unwrap_err();
        assert_eq!(err, ValidationError::EmptyArchive);
    }

    #[test]
    fn test_rejects_archive_of_only_noise() {
        let bytes = build_zip(&[(".DS_Store", b"x"), ("__MACOSX/._a", b"y")]);
        let err = ArchiveExtractor::default().extract("noise.zip", &bytes).unwrap_err();
        assert_eq!(err, ValidationError::EmptyArchive);
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        let err = ArchiveExtractor::default()
            .extract("broken.zip", b"definitely not a zip")
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedArchive(_)));
    }

    #[test]
    fn test_enforces_file_size_limit() {
        let extractor = ArchiveExtractor::new(ArchiveConfig {
            max_entries: 10,
            max_total_bytes: 1024,
            max_file_bytes: 4,
        });
        let bytes = build_zip(&[("big.txt", b"0123456789")]);
        let err = extractor.extract("big.zip", &bytes).unwrap_err();
        assert!(matches!(err, ValidationError::ArchiveTooLarge(_)));
    }

    #[test]
    fn test_enforces_entry_limit() {
        let extractor = ArchiveExtractor::new(ArchiveConfig {
            max_entries: 1,
            ..ArchiveConfig::default()
        });
        let bytes = build_zip(&[("a.py", b"a"), ("b.py", b"b")]);
        let err = extractor.extract("many.zip", &bytes).unwrap_err();
        assert!(matches!(err, ValidationError::ArchiveTooLarge(_)));
    }

    #[test]
    fn test_normalize_entry_name() {
        assert_eq!(normalize_entry_name("a/./b.py").as_deref(), Some("a/b.py"));
        assert_eq!(normalize_entry_name("a\\b.py").as_deref(), Some("a/b.py"));
        assert_eq!(normalize_entry_name("a/../b.py"), None);
        assert_eq!(normalize_entry_name("C:/x.py"), None);
    }

    #[test]
    fn test_subtree_path() {
        assert_eq!(subtree_path("templates/a.html", "templates"), Some("a.html"));
        assert_eq!(subtree_path("app/templates/x/a.html", "templates"), Some("x/a.html"));
        assert_eq!(subtree_path("templates.py", "templates"), None);
        assert_eq!(subtree_path("templates/", "templates"), None);
    }
}
