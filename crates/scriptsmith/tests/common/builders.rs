//! Builders for configs and uploaded project archives.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;

use scriptsmith::config::{ArchiveConfig, Browser, Config};

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Defaults suited to tests: one worker, chromium, no database path.
    pub fn new() -> Self {
        Self {
            config: Config {
                worker_count: 1,
                ..Config::default()
            },
        }
    }

    pub fn database_path(mut self, path: &str) -> Self {
        self.config.database_path = Some(path.to_string());
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn default_browser(mut self, browser: Browser) -> Self {
        self.config.default_browser = browser;
        self
    }

    pub fn archive_limits(mut self, limits: ArchiveConfig) -> Self {
        self.config.archive = limits;
        self
    }

    pub fn task_retention_hours(mut self, hours: u64) -> Self {
        self.config.task_retention_hours = hours;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for in-memory zip uploads.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, content: &str) -> Self {
        self.entries.push((name.to_string(), content.as_bytes().to_vec()));
        self
    }

    pub fn binary(mut self, name: &str, content: &[u8]) -> Self {
        self.entries.push((name.to_string(), content.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in &self.entries {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

/// A small Flask shop wrapped in a single root directory.
pub fn flask_project_zip() -> Vec<u8> {
    ZipBuilder::new()
        .file(
            "shop/app.py",
            "from flask import Flask\napp = Flask(__name__)\n\nfrom routes import *\n",
        )
        .file(
            "shop/routes.py",
            "from app import app\n\n@app.route('/')\ndef index():\n    return 'home'\n",
        )
        .file("shop/templates/index.html", "<html><body>Shop</body></html>")
        .file("shop/__pycache__/app.cpython-311.pyc", "noise")
        .build()
}

/// An archive with one entry escaping the extraction root.
pub fn traversal_zip() -> Vec<u8> {
    ZipBuilder::new()
        .file("app.py", "from flask import Flask\n")
        .file("../../etc/passwd", "root:x:0:0")
        .build()
}
