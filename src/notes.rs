//! Note discovery: walk the notes root and read every matching file.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use walkdir::WalkDir;

use notegraph_core::models::SourceDocument;

use crate::config::NotesConfig;

/// Scan `config.root` for notes, sorted by relative path.
///
/// Files that are not valid UTF-8 are skipped with a warning. Two files whose
/// names map to the same source identifier (`a b.md` and `a_b.md`) would
/// overwrite each other's graph contribution, so that is an error.
pub fn scan_notes(config: &NotesConfig) -> Result<Vec<SourceDocument>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Notes root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/.obsidian/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut docs = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable note");
                continue;
            }
        };

        docs.push(SourceDocument::new(rel_str, text));
    }

    docs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut seen: HashMap<&str, &str> = HashMap::new();
    for doc in &docs {
        if let Some(other) = seen.insert(&doc.source_id, &doc.name) {
            bail!(
                "Notes '{}' and '{}' both map to source id '{}'; rename one of them",
                other,
                doc.name,
                doc.source_id
            );
        }
    }

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn notes_config(root: PathBuf) -> NotesConfig {
        NotesConfig {
            root,
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec!["drafts/**".to_string()],
            follow_symlinks: false,
        }
    }

    #[test]
    fn scan_filters_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("guides")).unwrap();
        std::fs::create_dir_all(root.join("drafts")).unwrap();
        std::fs::write(root.join("zeta.md"), "z").unwrap();
        std::fs::write(root.join("guides/async.md"), "a").unwrap();
        std::fs::write(root.join("drafts/wip.md"), "w").unwrap();
        std::fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = scan_notes(&notes_config(root.to_path_buf())).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["guides/async.md", "zeta.md"]);
        assert_eq!(docs[0].source_id, "note_guides_async");
    }

    #[test]
    fn colliding_source_ids_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a b.md"), "1").unwrap();
        std::fs::write(tmp.path().join("a_b.md"), "2").unwrap();

        let err = scan_notes(&notes_config(tmp.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("note_a_b"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(scan_notes(&notes_config(tmp.path().join("nope"))).is_err());
    }
}
