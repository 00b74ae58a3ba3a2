//! Set tests: loading from disk, linking extends and imports, caching and
//! development mode.

use std::fs;
use std::sync::Arc;

use stencil_kernel::{
    Cache, Error, InMemCache, InMemLoader, OsFileSystemLoader, ParseReason, RuntimeReason, Set,
    Template, Value, VarMap,
};
use tempfile::TempDir;

/// A cache the test can still inspect after handing it to a set.
#[derive(Clone, Default)]
struct SharedCache(Arc<InMemCache>);

impl Cache for SharedCache {
    fn get(&self, path: &str) -> Option<Arc<Template>> {
        self.0.get(path)
    }

    fn put(&self, path: &str, template: Arc<Template>) {
        self.0.put(path, template)
    }
}

fn disk(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, source) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, source).unwrap();
    }
    dir
}

fn memory(files: &[(&str, &str)]) -> Set {
    let loader = InMemLoader::new();
    for (path, source) in files {
        loader.set(path, *source).unwrap();
    }
    Set::builder(loader).build().unwrap()
}

fn render(set: &Set, name: &str) -> String {
    set.render(name, &VarMap::new(), Value::Null)
        .unwrap_or_else(|e| panic!("rendering {name}: {e}"))
}

// =============================================================================
// LOADING
// =============================================================================

#[test]
fn loads_from_a_directory() {
    let dir = disk(&[
        ("layouts/base.jet", "<main>{{ yield body() }}</main>"),
        ("views/home.jet", "{{ extends \"../layouts/base\" }}{{ block body() }}home{{ end }}"),
    ]);
    let set = Set::builder(OsFileSystemLoader::new(dir.path())).build().unwrap();
    assert_eq!(render(&set, "views/home"), "<main>home</main>");
}

#[test]
fn missing_files_are_not_found() {
    let dir = disk(&[]);
    let set = Set::builder(OsFileSystemLoader::new(dir.path())).build().unwrap();
    let err = set.get_template("/nope").unwrap_err();
    assert!(matches!(err, Error::NotFound(ref p) if p == "/nope"), "{err}");
}

#[test]
fn parent_directories_do_not_escape_the_root() {
    let set = memory(&[("/a.jet", "a")]);
    assert_eq!(set.get_template("../../a").unwrap().name(), "/a.jet");
}

#[test]
fn parse_errors_surface_from_loading() {
    let set = memory(&[("/bad.jet", "{{ if x }}")]);
    match set.get_template("bad") {
        Err(Error::Parse(err)) => {
            assert_eq!(err.reason, ParseReason::UnexpectedEof);
            assert_eq!(err.template, "/bad.jet");
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn runtime_errors_surface_from_render() {
    let set = memory(&[("/page.jet", "{{ missing }}")]);
    match set.render("page", &VarMap::new(), Value::Null) {
        Err(Error::Runtime(err)) => assert_eq!(err.reason, RuntimeReason::UndefinedVariable),
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn broken_parents_fail_the_child() {
    let set = memory(&[("/child.jet", "{{ extends \"gone\" }}")]);
    assert!(matches!(set.get_template("child"), Err(Error::NotFound(p)) if p == "/gone"));
}

// =============================================================================
// LINKING
// =============================================================================

#[test]
fn imports_and_parent_blocks_merge() {
    let set = memory(&[
        ("/base.jet", "{{ block a() }}base-a{{ end }}/{{ yield b() }}"),
        ("/lib.jet", "{{ block b() }}lib-b{{ end }}"),
        (
            "/page.jet",
            "{{ extends \"base\" }}{{ import \"lib\" }}{{ block a() }}page-a{{ end }}",
        ),
    ]);
    assert_eq!(render(&set, "page"), "page-a/lib-b");
    let err = set.render("base", &VarMap::new(), Value::Null).unwrap_err();
    assert!(matches!(err, Error::Runtime(ref e) if e.reason == RuntimeReason::UndefinedBlock));
}

#[test]
fn multi_level_inheritance() {
    let set = memory(&[
        ("/root.jet", "[{{ yield title() }}|{{ yield body() }}]"),
        ("/mid.jet", "{{ extends \"root\" }}{{ block title() }}mid{{ end }}{{ block body() }}mid-body{{ end }}"),
        ("/leaf.jet", "{{ extends \"mid\" }}{{ block body() }}leaf{{ end }}"),
    ]);
    assert_eq!(render(&set, "leaf"), "[mid|leaf]");
}

#[test]
fn import_cycles_are_reported() {
    let set = memory(&[
        ("/a.jet", "{{ import \"b\" }}"),
        ("/b.jet", "{{ import \"a\" }}"),
    ]);
    assert!(matches!(set.get_template("a"), Err(Error::Cycle(_))));
}

#[test]
fn templates_print_back_to_source() {
    let set = memory(&[
        ("/base.jet", "base"),
        ("/lib.jet", ""),
        ("/page.jet", "{{extends \"base\"}}\n{{import \"lib\"}}body {{.X}}"),
    ]);
    let page = set.get_template("page").unwrap();
    assert_eq!(
        page.to_string(),
        "{{ extends \"base\" }}{{ import \"lib\" }}body {{ .X }}"
    );
    assert_eq!(page.extends().map(|t| t.name()), Some("/base.jet"));
    assert_eq!(page.imports().len(), 1);
}

// =============================================================================
// CACHING AND DEVELOPMENT MODE
// =============================================================================

#[test]
fn loads_are_cached_and_one_off_parses_are_not() {
    let cache = SharedCache::default();
    let loader = InMemLoader::new();
    loader.set("/a.jet", "a").unwrap();
    loader.set("/b.jet", "b").unwrap();
    let set = Set::builder(loader).cache(cache.clone()).build().unwrap();

    set.parse("/inline.jet", "{{ import \"b\" }}x").unwrap();
    assert!(cache.0.is_empty());

    set.get_template("a").unwrap();
    assert_eq!(cache.0.len(), 1);
    assert!(cache.get("/a.jet").is_some());
}

#[test]
fn cached_templates_survive_edits() {
    let dir = disk(&[("page.jet", "one")]);
    let set = Set::builder(OsFileSystemLoader::new(dir.path())).build().unwrap();
    assert_eq!(render(&set, "page"), "one");
    fs::write(dir.path().join("page.jet"), "two").unwrap();
    assert_eq!(render(&set, "page"), "one");
}

#[test]
fn development_mode_reloads_edits() {
    let dir = disk(&[("page.jet", "one")]);
    let cache = SharedCache::default();
    let set = Set::builder(OsFileSystemLoader::new(dir.path()))
        .cache(cache.clone())
        .development(true)
        .build()
        .unwrap();
    assert_eq!(render(&set, "page"), "one");
    fs::write(dir.path().join("page.jet"), "two").unwrap();
    assert_eq!(render(&set, "page"), "two");
    // Loads are still recorded.
    assert_eq!(cache.0.len(), 1);
}

#[test]
fn custom_extensions() {
    let set = {
        let loader = InMemLoader::new();
        loader.set("/page.tmpl", "tmpl").unwrap();
        loader.set("/page.jet", "jet").unwrap();
        Set::builder(loader).extensions([".tmpl"]).build().unwrap()
    };
    assert_eq!(render(&set, "page"), "tmpl");
    assert!(matches!(set.get_template("page.jet"), Err(Error::NotFound(_))));
}

#[test]
fn renders_share_a_set_across_threads() {
    let set = memory(&[("/hello.jet", "Hello {{ .Name }}")]);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let set = &set;
                scope.spawn(move || {
                    let context = Value::map([("Name", i)]);
                    set.render("hello", &VarMap::new(), context).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), format!("Hello {i}"));
        }
    });
}
