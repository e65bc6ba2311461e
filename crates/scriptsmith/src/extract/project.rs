use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A directory subtree of decoded text files, keyed by path segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTree {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dirs: BTreeMap<String, ProjectTree>,
}

impl ProjectTree {
    /// Inserts `content` at a `/`-separated path relative to this tree.
    pub fn insert(&mut self, relative: &str, content: String) {
        match relative.split_once('/') {
            Some((dir, rest)) => self
                .dirs
                .entry(dir.to_string())
                .or_default()
                .insert(rest, content),
            None => {
                self.files.insert(relative.to_string(), content);
            }
        }
    }

    /// Looks up a file by `/`-separated path.
    pub fn get(&self, relative: &str) -> Option<&str> {
        match relative.split_once('/') {
            Some((dir, rest)) => self.dirs.get(dir).and_then(|d| d.get(rest)),
            None => self.files.get(relative).map(String::as_str),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.values().map(ProjectTree::file_count).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }
}

/// In-memory view of an uploaded project.
///
/// Produced once by the extractor and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedProject {
    /// Every decoded text file, keyed by relative path.
    pub files: BTreeMap<String, String>,
    /// Files under `templates/`, nested by directory.
    #[serde(default)]
    pub templates: ProjectTree,
    /// Files under `static/`, nested by directory.
    #[serde(default)]
    pub static_assets: ProjectTree,
    /// Paths that were not valid UTF-8; content is not kept.
    #[serde(default)]
    pub binary_files: Vec<String>,
    /// All file paths in archive order.
    pub project_structure: Vec<String>,
}

impl ExtractedProject {
    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Finds a file by name anywhere in the project, preferring the shallowest match.
    pub fn find_by_name(&self, name: &str) -> Option<(&str, &str)> {
        self.files
            .iter()
            .filter(|(path, _)| path.rsplit('/').next() == Some(name))
            .min_by_key(|(path, _)| path.matches('/').count())
            .map(|(path, content)| (path.as_str(), content.as_str()))
    }

    pub fn has_file_named(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Compact description used as context for generation prompts.
    ///
    /// Lists the manifest and includes the content of the key source files,
    /// each truncated to `max_file_chars`.
    pub fn context_summary(&self, max_file_chars: usize) -> String {
        const KEY_FILES: &[&str] = &[
            "app.py",
            "routes.py",
            "models.py",
            "forms.py",
            "views.py",
            "urls.py",
            "main.py",
            "config.py",
            "package.json",
        ];

        let mut out = String::from("Project structure:\n");
        for path in &self.project_structure {
            out.push_str("- ");
            out.push_str(path);
            out.push('\n');
        }

        for name in KEY_FILES {
            if let Some((path, content)) = self.find_by_name(name) {
                if content.trim().is_empty() {
                    continue;
                }
                out.push_str(&format!("\n--- {} ---\n", path));
                out.push_str(&truncate_chars(content, max_file_chars));
                out.push('\n');
            }
        }

        out
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}
