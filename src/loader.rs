//! Template loaders.
//!
//! A [`Loader`] resolves template names to source text.  The environment
//! invokes it on cache misses and consults [`uptodate`](Loader::uptodate)
//! when auto reloading is enabled.
//!
//! ```
//! use vinja::loader::FileSystemLoader;
//! use vinja::Environment;
//!
//! fn create_env() -> Environment {
//!     let mut env = Environment::new();
//!     env.set_loader(FileSystemLoader::new("path/to/templates"));
//!     env
//! }
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, ErrorKind};

/// A template source produced by a loader.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    /// The template source text.
    pub source: String,
    /// The filename the template was loaded from, if any.
    pub filename: Option<PathBuf>,
    /// The last modification time, used by auto reloading.
    pub last_modified: Option<SystemTime>,
}

impl LoadedSource {
    /// Creates a loaded source from a string.
    pub fn from_source<S: Into<String>>(source: S) -> LoadedSource {
        LoadedSource {
            source: source.into(),
            filename: None,
            last_modified: None,
        }
    }
}

/// A trait for resolving template names to sources.
pub trait Loader: Send + Sync {
    /// Loads a template or fails with
    /// [`TemplateNotFound`](crate::ErrorKind::TemplateNotFound).
    fn load(&self, name: &str) -> Result<LoadedSource, Error>;

    /// Lists all templates known to the loader.
    ///
    /// Loaders that cannot enumerate their templates return `None`.
    fn list_templates(&self) -> Option<Vec<String>> {
        None
    }

    /// Checks if a cached template is still up to date.
    ///
    /// The default never considers templates stale.
    fn uptodate(&self, name: &str, last_modified: Option<SystemTime>) -> bool {
        let _ = (name, last_modified);
        true
    }
}

/// Safely joins two paths.
pub(crate) fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

/// Loads templates from a directory.
///
/// Template names use forward slashes as separators; names that try to
/// escape the root (or reference dotted files) do not resolve.
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    /// Creates a loader rooted at the given directory.
    pub fn new<P: AsRef<Path>>(root: P) -> FileSystemLoader {
        FileSystemLoader {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl fmt::Debug for FileSystemLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemLoader")
            .field("root", &self.root)
            .finish()
    }
}

impl Loader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<LoadedSource, Error> {
        let path = match safe_join(&self.root, name) {
            Some(path) => path,
            None => return Err(Error::new_not_found(name)),
        };
        match fs::read_to_string(&path) {
            Ok(source) => Ok(LoadedSource {
                source,
                last_modified: fs::metadata(&path).ok().and_then(|x| x.modified().ok()),
                filename: Some(path),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::new_not_found(name)),
            Err(err) => Err(
                Error::new(ErrorKind::InvalidOperation, "could not read template")
                    .with_source(err),
            ),
        }
    }

    fn list_templates(&self) -> Option<Vec<String>> {
        fn walk(dir: &Path, prefix: &str, rv: &mut Vec<String>) {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(_) => return,
            };
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let name = match file_name.to_str() {
                    Some(name) if !name.starts_with('.') => name,
                    _ => continue,
                };
                let path = entry.path();
                let full_name = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}/{name}")
                };
                if path.is_dir() {
                    walk(&path, &full_name, rv);
                } else {
                    rv.push(full_name);
                }
            }
        }

        let mut rv = Vec::new();
        walk(&self.root, "", &mut rv);
        rv.sort();
        Some(rv)
    }

    fn uptodate(&self, name: &str, last_modified: Option<SystemTime>) -> bool {
        let path = match safe_join(&self.root, name) {
            Some(path) => path,
            None => return true,
        };
        let current = fs::metadata(&path).ok().and_then(|x| x.modified().ok());
        current == last_modified
    }
}

/// Loads templates from an in-memory mapping.
#[derive(Debug, Default)]
pub struct DictLoader {
    templates: BTreeMap<String, String>,
}

impl DictLoader {
    /// Creates a dict loader from a mapping of names to sources.
    pub fn new<I, K, V>(templates: I) -> DictLoader
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        DictLoader {
            templates: templates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Adds another template.
    pub fn add_template<K: Into<String>, V: Into<String>>(&mut self, name: K, source: V) {
        self.templates.insert(name.into(), source.into());
    }
}

impl Loader for DictLoader {
    fn load(&self, name: &str) -> Result<LoadedSource, Error> {
        match self.templates.get(name) {
            Some(source) => Ok(LoadedSource::from_source(source.clone())),
            None => Err(Error::new_not_found(name)),
        }
    }

    fn list_templates(&self) -> Option<Vec<String>> {
        Some(self.templates.keys().cloned().collect())
    }
}

type LoadFunc = dyn Fn(&str) -> Result<Option<String>, Error> + Send + Sync;

/// Loads templates through a callback.
///
/// The callback returns `Ok(None)` for unknown templates which is turned
/// into a [`TemplateNotFound`](crate::ErrorKind::TemplateNotFound) error.
pub struct FnLoader {
    load: Box<LoadFunc>,
}

impl FnLoader {
    /// Creates a loader from a callback.
    pub fn new<F>(f: F) -> FnLoader
    where
        F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
    {
        FnLoader { load: Box::new(f) }
    }
}

impl fmt::Debug for FnLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader").finish()
    }
}

impl Loader for FnLoader {
    fn load(&self, name: &str) -> Result<LoadedSource, Error> {
        match ok!((self.load)(name)) {
            Some(source) => Ok(LoadedSource::from_source(source)),
            None => Err(Error::new_not_found(name)),
        }
    }
}

/// Routes template names by prefix to other loaders.
///
/// The name `app/index.html` is looked up in the loader mounted at
/// `app` with the remaining name `index.html`.
#[derive(Default)]
pub struct PrefixLoader {
    mounts: BTreeMap<String, Box<dyn Loader>>,
}

impl PrefixLoader {
    /// Creates an empty prefix loader.
    pub fn new() -> PrefixLoader {
        PrefixLoader::default()
    }

    /// Mounts a loader under a prefix.
    pub fn mount<L: Loader + 'static>(mut self, prefix: &str, loader: L) -> PrefixLoader {
        self.mounts.insert(prefix.to_string(), Box::new(loader));
        self
    }

    fn split<'n>(&self, name: &'n str) -> Option<(&dyn Loader, &'n str)> {
        let (prefix, rest) = some!(name.split_once('/'));
        self.mounts
            .get(prefix)
            .map(|loader| (&**loader, rest))
    }
}

impl Loader for PrefixLoader {
    fn load(&self, name: &str) -> Result<LoadedSource, Error> {
        match self.split(name) {
            Some((loader, rest)) => loader.load(rest),
            None => Err(Error::new_not_found(name)),
        }
    }

    fn list_templates(&self) -> Option<Vec<String>> {
        let mut rv = Vec::new();
        for (prefix, loader) in &self.mounts {
            for name in loader.list_templates()? {
                rv.push(format!("{prefix}/{name}"));
            }
        }
        rv.sort();
        Some(rv)
    }

    fn uptodate(&self, name: &str, last_modified: Option<SystemTime>) -> bool {
        match self.split(name) {
            Some((loader, rest)) => loader.uptodate(rest, last_modified),
            None => true,
        }
    }
}

/// Tries a sequence of loaders in order.
#[derive(Default)]
pub struct ChoiceLoader {
    loaders: Vec<Box<dyn Loader>>,
}

impl ChoiceLoader {
    /// Creates an empty choice loader.
    pub fn new() -> ChoiceLoader {
        ChoiceLoader::default()
    }

    /// Appends another loader.
    pub fn with<L: Loader + 'static>(mut self, loader: L) -> ChoiceLoader {
        self.loaders.push(Box::new(loader));
        self
    }
}

impl Loader for ChoiceLoader {
    fn load(&self, name: &str) -> Result<LoadedSource, Error> {
        for loader in &self.loaders {
            match loader.load(name) {
                Ok(rv) => return Ok(rv),
                Err(err) if err.kind() == ErrorKind::TemplateNotFound => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::new_not_found(name))
    }

    fn list_templates(&self) -> Option<Vec<String>> {
        let mut rv = Vec::new();
        for loader in &self.loaders {
            rv.extend(loader.list_templates()?);
        }
        rv.sort();
        rv.dedup();
        Some(rv)
    }

    fn uptodate(&self, name: &str, last_modified: Option<SystemTime>) -> bool {
        self.loaders
            .iter()
            .all(|loader| loader.uptodate(name, last_modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_safe_join() {
        assert_eq!(
            safe_join(Path::new("foo"), "bar/baz"),
            Some(PathBuf::from("foo").join("bar").join("baz"))
        );
        assert_eq!(safe_join(Path::new("foo"), ".bar/baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/.baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/../baz"), None);
    }

    #[test]
    fn test_dict_loader() {
        let loader = DictLoader::new([("a.txt", "A")]);
        assert_eq!(loader.load("a.txt").unwrap().source, "A");
        assert_eq!(
            loader.load("missing.txt").unwrap_err().kind(),
            ErrorKind::TemplateNotFound
        );
        assert_eq!(loader.list_templates(), Some(vec!["a.txt".to_string()]));
    }

    #[test]
    fn test_prefix_loader() {
        let loader = PrefixLoader::new()
            .mount("app", DictLoader::new([("index.html", "A")]))
            .mount("admin", DictLoader::new([("index.html", "B")]));
        assert_eq!(loader.load("app/index.html").unwrap().source, "A");
        assert_eq!(loader.load("admin/index.html").unwrap().source, "B");
        assert_eq!(
            loader.load("other/index.html").unwrap_err().kind(),
            ErrorKind::TemplateNotFound
        );
    }

    #[test]
    fn test_choice_loader() {
        let loader = ChoiceLoader::new()
            .with(DictLoader::new([("a.txt", "A")]))
            .with(DictLoader::new([("a.txt", "SHADOWED"), ("b.txt", "B")]));
        assert_eq!(loader.load("a.txt").unwrap().source, "A");
        assert_eq!(loader.load("b.txt").unwrap().source, "B");
        assert_eq!(
            loader.load("c.txt").unwrap_err().kind(),
            ErrorKind::TemplateNotFound
        );
    }
}
