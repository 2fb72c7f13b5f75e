use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use vinja::loader::{ChoiceLoader, DictLoader, FnLoader, LoadedSource, Loader, PrefixLoader};
use vinja::{context, Environment, ErrorKind};

use similar_asserts::assert_eq;

#[test]
fn test_dict_loader_via_env() {
    let mut env = Environment::new();
    env.set_loader(DictLoader::new([("hello.txt", "Hello {{ name }}!")]));
    let rv = env
        .get_template("hello.txt")
        .unwrap()
        .render(context!(name => "World"))
        .unwrap();
    assert_eq!(rv, "Hello World!");
    let err = env.get_template("missing.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_fn_loader() {
    let mut env = Environment::new();
    env.set_loader(FnLoader::new(|name| {
        if name == "layout.html" {
            Ok(Some("L".into()))
        } else {
            Ok(None)
        }
    }));
    assert_eq!(
        env.get_template("layout.html").unwrap().render(context!()).unwrap(),
        "L"
    );
    assert_eq!(
        env.get_template("other").unwrap_err().kind(),
        ErrorKind::TemplateNotFound
    );
}

#[test]
fn test_prefix_and_choice_loaders_via_env() {
    let mut env = Environment::new();
    env.set_loader(
        ChoiceLoader::new()
            .with(PrefixLoader::new().mount("app", DictLoader::new([("a.txt", "app-a")])))
            .with(DictLoader::new([("b.txt", "top-b")])),
    );
    assert_eq!(
        env.get_template("app/a.txt").unwrap().render(context!()).unwrap(),
        "app-a"
    );
    assert_eq!(
        env.get_template("b.txt").unwrap().render(context!()).unwrap(),
        "top-b"
    );
}

#[test]
fn test_list_templates() {
    let mut env = Environment::new();
    env.add_template("inline.txt", "x").unwrap();
    env.set_loader(DictLoader::new([("loaded.txt", "y")]));
    assert_eq!(
        env.list_templates(),
        vec!["inline.txt".to_string(), "loaded.txt".to_string()]
    );
}

/// A loader whose template can be flipped to stale.
struct ReloadingLoader {
    source: Mutex<String>,
    stale: AtomicBool,
    loads: AtomicUsize,
}

impl Loader for ReloadingLoader {
    fn load(&self, _name: &str) -> Result<LoadedSource, vinja::Error> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.stale.store(false, Ordering::SeqCst);
        Ok(LoadedSource {
            source: self.source.lock().unwrap().clone(),
            filename: None,
            last_modified: Some(SystemTime::UNIX_EPOCH),
        })
    }

    fn uptodate(&self, _name: &str, _last_modified: Option<SystemTime>) -> bool {
        !self.stale.load(Ordering::SeqCst)
    }
}

#[test]
fn test_auto_reload() {
    let loader = Arc::new(ReloadingLoader {
        source: Mutex::new("v1".to_string()),
        stale: AtomicBool::new(false),
        loads: AtomicUsize::new(0),
    });

    struct SharedLoader(Arc<ReloadingLoader>);
    impl Loader for SharedLoader {
        fn load(&self, name: &str) -> Result<LoadedSource, vinja::Error> {
            self.0.load(name)
        }
        fn uptodate(&self, name: &str, last_modified: Option<SystemTime>) -> bool {
            self.0.uptodate(name, last_modified)
        }
    }

    let mut env = Environment::new();
    env.set_loader(SharedLoader(loader.clone()));
    env.set_auto_reload(true);

    assert_eq!(env.get_template("t").unwrap().render(context!()).unwrap(), "v1");
    assert_eq!(env.get_template("t").unwrap().render(context!()).unwrap(), "v1");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

    // flip the template to stale; the next lookup recompiles
    *loader.source.lock().unwrap() = "v2".to_string();
    loader.stale.store(true, Ordering::SeqCst);
    assert_eq!(env.get_template("t").unwrap().render(context!()).unwrap(), "v2");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_no_reload_without_flag() {
    let loader = Arc::new(ReloadingLoader {
        source: Mutex::new("v1".to_string()),
        stale: AtomicBool::new(false),
        loads: AtomicUsize::new(0),
    });

    struct SharedLoader(Arc<ReloadingLoader>);
    impl Loader for SharedLoader {
        fn load(&self, name: &str) -> Result<LoadedSource, vinja::Error> {
            self.0.load(name)
        }
        fn uptodate(&self, name: &str, last_modified: Option<SystemTime>) -> bool {
            self.0.uptodate(name, last_modified)
        }
    }

    let mut env = Environment::new();
    env.set_loader(SharedLoader(loader.clone()));

    assert_eq!(env.get_template("t").unwrap().render(context!()).unwrap(), "v1");
    loader.stale.store(true, Ordering::SeqCst);
    *loader.source.lock().unwrap() = "v2".to_string();
    // without auto reload the cached template keeps serving
    assert_eq!(env.get_template("t").unwrap().render(context!()).unwrap(), "v1");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}
