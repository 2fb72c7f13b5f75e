use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vinja::loader::{LoadedSource, Loader};
use vinja::{context, Environment};

use similar_asserts::assert_eq;

struct CountingLoader {
    loads: Arc<AtomicUsize>,
}

impl Loader for CountingLoader {
    fn load(&self, name: &str) -> Result<LoadedSource, vinja::Error> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(LoadedSource::from_source(format!("template {name}")))
    }
}

#[test]
fn test_cache_hit_counting() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    env.set_loader(CountingLoader {
        loads: loads.clone(),
    });

    env.get_template("a").unwrap();
    env.get_template("a").unwrap();
    env.get_template("a").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let stats = env.cache_stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_lru_eviction_via_env() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    env.set_loader(CountingLoader {
        loads: loads.clone(),
    });
    env.set_cache_capacity(2);

    env.get_template("a").unwrap();
    env.get_template("b").unwrap();
    // touch a; b is now least recently used
    env.get_template("a").unwrap();
    env.get_template("c").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 3);

    // a and c are still cached, b was evicted and needs a fresh load
    env.get_template("a").unwrap();
    env.get_template("c").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 3);
    env.get_template("b").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 4);
}

#[test]
fn test_added_templates_are_not_evicted() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    env.set_loader(CountingLoader {
        loads: loads.clone(),
    });
    env.set_cache_capacity(1);
    env.add_template("pinned", "pinned {{ x }}").unwrap();

    env.get_template("a").unwrap();
    env.get_template("b").unwrap();
    // the pinned template never goes through the loader
    let rv = env
        .get_template("pinned")
        .unwrap()
        .render(context!(x => 1))
        .unwrap();
    assert_eq!(rv, "pinned 1");
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_remove_template_invalidates_cache() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    env.set_loader(CountingLoader {
        loads: loads.clone(),
    });

    env.get_template("a").unwrap();
    env.remove_template("a");
    env.get_template("a").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}
