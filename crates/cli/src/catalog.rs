use std::path::PathBuf;

use {fontbot_store::FontCatalog, tracing::warn, walkdir::WalkDir};

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc", "woff", "woff2"];

/// Counts font files under a directory tree. No directory means no fonts.
pub struct DirectoryCatalog {
    root: Option<PathBuf>,
}

impl DirectoryCatalog {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl FontCatalog for DirectoryCatalog {
    fn font_count(&self) -> usize {
        let Some(root) = &self.root else {
            return 0;
        };

        WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry in font directory");
                    None
                },
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        FONT_EXTENSIONS
                            .iter()
                            .any(|known| ext.eq_ignore_ascii_case(known))
                    })
            })
            .count()
    }
}
