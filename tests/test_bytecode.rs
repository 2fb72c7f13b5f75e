use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vinja::bccache::{BytecodeCache, MemoryBytecodeCache};
use vinja::loader::DictLoader;
use vinja::{context, Environment};

use similar_asserts::assert_eq;

/// A shim so one memory cache can back multiple environments.
struct SharedCache(Arc<MemoryBytecodeCache>);

impl BytecodeCache for SharedCache {
    fn load_bucket(&self, key: u64, checksum: u64) -> Option<Vec<u8>> {
        self.0.load_bucket(key, checksum)
    }
    fn dump_bucket(&self, key: u64, checksum: u64, payload: &[u8]) {
        self.0.dump_bucket(key, checksum, payload)
    }
    fn clear(&self) {
        self.0.clear()
    }
}

/// Records every load/dump so tests can observe traffic.
#[derive(Default)]
struct RecordingCache {
    store: Mutex<std::collections::HashMap<u64, Vec<u8>>>,
    dumps: AtomicUsize,
    hits: AtomicUsize,
}

impl BytecodeCache for RecordingCache {
    fn load_bucket(&self, key: u64, _checksum: u64) -> Option<Vec<u8>> {
        let rv = self.store.lock().unwrap().get(&key).cloned();
        if rv.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        rv
    }
    fn dump_bucket(&self, key: u64, _checksum: u64, payload: &[u8]) {
        self.dumps.fetch_add(1, Ordering::SeqCst);
        self.store.lock().unwrap().insert(key, payload.to_vec());
    }
    fn clear(&self) {
        self.store.lock().unwrap().clear();
    }
}

const SOURCE: &str = "{% for i in items %}{{ i|upper }}{% endfor %}";

#[test]
fn test_bytecode_cache_round_trip() {
    let shared = Arc::new(MemoryBytecodeCache::new());

    let mut env1 = Environment::new();
    env1.set_loader(DictLoader::new([("t.txt", SOURCE)]));
    env1.set_bytecode_cache(SharedCache(shared.clone()));
    let rv = env1
        .get_template("t.txt")
        .unwrap()
        .render(context!(items => vec!["a", "b"]))
        .unwrap();
    assert_eq!(rv, "AB");

    // a second environment renders from the persisted bytecode
    let mut env2 = Environment::new();
    env2.set_loader(DictLoader::new([("t.txt", SOURCE)]));
    env2.set_bytecode_cache(SharedCache(shared));
    let rv = env2
        .get_template("t.txt")
        .unwrap()
        .render(context!(items => vec!["a", "b"]))
        .unwrap();
    assert_eq!(rv, "AB");
}

#[test]
fn test_bytecode_cache_traffic() {
    let recording = Arc::new(RecordingCache::default());

    struct Shim(Arc<RecordingCache>);
    impl BytecodeCache for Shim {
        fn load_bucket(&self, key: u64, checksum: u64) -> Option<Vec<u8>> {
            self.0.load_bucket(key, checksum)
        }
        fn dump_bucket(&self, key: u64, checksum: u64, payload: &[u8]) {
            self.0.dump_bucket(key, checksum, payload)
        }
        fn clear(&self) {
            self.0.clear()
        }
    }

    let mut env = Environment::new();
    env.set_loader(DictLoader::new([("t.txt", SOURCE)]));
    env.set_bytecode_cache(Shim(recording.clone()));
    env.get_template("t.txt").unwrap();
    assert_eq!(recording.dumps.load(Ordering::SeqCst), 1);

    // a fresh environment is served from the bucket without re-dumping
    let mut env = Environment::new();
    env.set_loader(DictLoader::new([("t.txt", SOURCE)]));
    env.set_bytecode_cache(Shim(recording.clone()));
    let rv = env
        .get_template("t.txt")
        .unwrap()
        .render(context!(items => vec!["x"]))
        .unwrap();
    assert_eq!(rv, "X");
    assert_eq!(recording.dumps.load(Ordering::SeqCst), 1);
    assert_eq!(recording.hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_changed_source_misses() {
    let recording = Arc::new(RecordingCache::default());

    struct Shim(Arc<RecordingCache>);
    impl BytecodeCache for Shim {
        fn load_bucket(&self, key: u64, checksum: u64) -> Option<Vec<u8>> {
            self.0.load_bucket(key, checksum)
        }
        fn dump_bucket(&self, key: u64, checksum: u64, payload: &[u8]) {
            self.0.dump_bucket(key, checksum, payload)
        }
        fn clear(&self) {
            self.0.clear()
        }
    }

    let mut env = Environment::new();
    env.set_loader(DictLoader::new([("t.txt", "old {{ x }}")]));
    env.set_bytecode_cache(Shim(recording.clone()));
    env.get_template("t.txt").unwrap();

    // same name, different source: the stale payload is ignored because
    // the embedded checksum no longer matches
    let mut env = Environment::new();
    env.set_loader(DictLoader::new([("t.txt", "new {{ x }}")]));
    env.set_bytecode_cache(Shim(recording.clone()));
    let rv = env
        .get_template("t.txt")
        .unwrap()
        .render(context!(x => 1))
        .unwrap();
    assert_eq!(rv, "new 1");
    assert_eq!(recording.dumps.load(Ordering::SeqCst), 2);
}

#[test]
fn test_corrupt_payload_is_miss() {
    let shared = Arc::new(MemoryBytecodeCache::new());
    // poison the bucket with garbage; rendering falls back to compiling
    let key = vinja::machinery::marshal::cache_key("t.txt", None);
    let checksum = vinja::machinery::marshal::source_checksum(SOURCE);
    shared.dump_bucket(key, checksum, b"garbage");

    let mut env = Environment::new();
    env.set_loader(DictLoader::new([("t.txt", SOURCE)]));
    env.set_bytecode_cache(SharedCache(shared));
    let rv = env
        .get_template("t.txt")
        .unwrap()
        .render(context!(items => vec!["a"]))
        .unwrap();
    assert_eq!(rv, "A");
}
