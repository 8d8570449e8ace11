//! Template Store
//!
//! Named queries kept as flat JSON descriptor files, one `<slug>.json` per
//! template.

use std::fs;
use std::path::{Path, PathBuf};

use super::descriptor::TemplateDescriptor;
use super::error::{BridgeError, BridgeResult};

/// File-backed store of [`TemplateDescriptor`]s
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

/// Slug derived from a template name: lowercase alphanumerics joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn validate_slug(slug: &str) -> BridgeResult<()> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BridgeError::InvalidTemplate {
            message: format!("invalid slug '{slug}'"),
        })
    }
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.json"))
    }

    /// All readable templates, sorted by slug. A missing directory is empty.
    pub fn list(&self) -> BridgeResult<Vec<(String, TemplateDescriptor)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut templates = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match read_template(&path) {
                Ok(template) => templates.push((slug.to_string(), template)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping_unreadable_template");
                }
            }
        }
        templates.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(templates)
    }

    pub fn get(&self, slug: &str) -> BridgeResult<TemplateDescriptor> {
        validate_slug(slug)?;
        let path = self.path_for(slug);
        if !path.exists() {
            return Err(BridgeError::TemplateNotFound {
                slug: slug.to_string(),
            });
        }
        read_template(&path)
    }

    /// Write `template` under the slug of its name, replacing any previous file.
    pub fn save(&self, template: &TemplateDescriptor) -> BridgeResult<String> {
        let slug = slugify(&template.name);
        if slug.is_empty() {
            return Err(BridgeError::InvalidTemplate {
                message: format!("name '{}' yields an empty slug", template.name),
            });
        }
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(template)?;
        let path = self.path_for(&slug);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        tracing::info!(slug = %slug, "template_saved");
        Ok(slug)
    }
}

fn read_template(path: &Path) -> BridgeResult<TemplateDescriptor> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str) -> TemplateDescriptor {
        TemplateDescriptor {
            name: name.to_string(),
            description: Some("test".to_string()),
            query: "SELECT * FROM t".to_string(),
            parameters: vec![],
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Top Orders"), "top-orders");
        assert_eq!(slugify("  Revenue / Month (EU) "), "revenue-month-eu");
        assert_eq!(slugify("a--b"), "a-b");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_missing_dir_lists_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_get() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path().join("templates"));
        let slug = store.save(&template("Daily Active Users")).unwrap();
        assert_eq!(slug, "daily-active-users");
        assert_eq!(store.get(&slug).unwrap(), template("Daily Active Users"));
    }

    #[test]
    fn test_save_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        store.save(&template("q")).unwrap();
        let mut updated = template("q");
        updated.query = "SELECT 2".to_string();
        store.save(&updated).unwrap();
        assert_eq!(store.get("q").unwrap().query, "SELECT 2");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_list_sorted_and_skips_bad_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        store.save(&template("zeta")).unwrap();
        store.save(&template("alpha")).unwrap();
        fs::write(tmp.path().join("broken.json"), b"{").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"ignored").unwrap();

        let slugs: Vec<String> = store.list().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(slugs, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_get_unknown_slug() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        assert!(matches!(
            store.get("nope"),
            Err(BridgeError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_get_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(BridgeError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_save_rejects_empty_slug() {
        let tmp = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(tmp.path());
        assert!(store.save(&template("???")).is_err());
    }
}
