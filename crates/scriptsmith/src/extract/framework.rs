use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::project::ExtractedProject;

/// Web framework detected in an uploaded project.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Flask,
    Django,
    FastApi,
    Express,
    #[default]
    Unknown,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Flask => "flask",
            Framework::Django => "django",
            Framework::FastApi => "fastapi",
            Framework::Express => "express",
            Framework::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Framework::Flask => "Flask",
            Framework::Django => "Django",
            Framework::FastApi => "FastAPI",
            Framework::Express => "Express",
            Framework::Unknown => "an unknown framework",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static RE_DJANGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(from\s+django[\s.]|import\s+django)").unwrap());
static RE_FASTAPI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^\s*from\s+fastapi\s+import|\bFastAPI\s*\()").unwrap()
});
static RE_FLASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^\s*from\s+flask\s+import|\bFlask\s*\(\s*__name__|\bBlueprint\s*\()").unwrap()
});
static RE_EXPRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\(\s*['"]express['"]\s*\)|from\s+['"]express['"]"#).unwrap()
});

struct Signature {
    framework: Framework,
    /// Matches any file named like this counts as a hit.
    marker_files: &'static [&'static str],
    /// Applied to source contents.
    content_pattern: &'static LazyLock<Regex>,
    /// File extensions whose content is checked.
    extensions: &'static [&'static str],
}

static SIGNATURES: &[Signature] = &[
    Signature {
        framework: Framework::Django,
        marker_files: &["manage.py"],
        content_pattern: &RE_DJANGO,
        extensions: &["py"],
    },
    Signature {
        framework: Framework::FastApi,
        marker_files: &[],
        content_pattern: &RE_FASTAPI,
        extensions: &["py"],
    },
    Signature {
        framework: Framework::Flask,
        marker_files: &[],
        content_pattern: &RE_FLASK,
        extensions: &["py"],
    },
    Signature {
        framework: Framework::Express,
        marker_files: &[],
        content_pattern: &RE_EXPRESS,
        extensions: &["js", "ts", "mjs", "cjs"],
    },
];

/// Best-effort framework classification over the project manifest and sources.
///
/// Signatures are checked in order; the first hit wins. Returns
/// [`Framework::Unknown`] when nothing matches.
pub fn detect_framework(project: &ExtractedProject) -> Framework {
    for signature in SIGNATURES {
        if signature
            .marker_files
            .iter()
            .any(|name| project.has_file_named(name))
        {
            return signature.framework;
        }

        let pattern: &Regex = signature.content_pattern;
        let hit = project.files.iter().any(|(path, content)| {
            let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
            signature.extensions.contains(&ext) && pattern.is_match(content)
        });
        if hit {
            return signature.framework;
        }
    }

    if let Some((_, package_json)) = project.find_by_name("package.json") {
        if package_json.contains("\"express\"") {
            return Framework::Express;
        }
    }

    Framework::Unknown
}
