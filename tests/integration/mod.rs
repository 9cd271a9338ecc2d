//! End-to-end tests through the public loader entry points.

use guildfile::{
    is_guildfile_dir, GuildfileError, GuildfileHook, Loader, ModelRef, OpRef, RunRef,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_load_from_dir() {
    init_tracing();
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "guild.yml",
        "- model: mnist\n  operations:\n    train: train.py",
    );
    let mut loader = Loader::new();
    let gf = loader.for_dir(temp.path(), false).unwrap();
    assert!(is_guildfile_dir(temp.path()));
    let op = gf.model("mnist").unwrap().operation("train").unwrap();
    assert_eq!(op.main.as_deref(), Some("train.py"));
}

#[test]
fn test_dir_without_guildfile_is_no_models() {
    let temp = tempdir().unwrap();
    let mut loader = Loader::new();
    let err = loader.for_dir(temp.path(), false).unwrap_err();
    assert!(matches!(err, GuildfileError::NoModels { .. }));
}

#[test]
fn test_cache_shares_handles() {
    let temp = tempdir().unwrap();
    write(temp.path(), "guild.yml", "train: train.py");
    let src = temp.path().join("guild.yml");
    let mut loader = Loader::new();
    let a = loader.for_file(&src, false).unwrap();
    let b = loader.for_file(&src, false).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(loader.cache().len(), 1);

    let c = loader.for_file(&src, true).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));

    loader.cache().clear();
    assert!(loader.cache().is_empty());
    let d = loader.for_file(&src, false).unwrap();
    assert!(!Arc::ptr_eq(&a, &d));
}

#[test]
fn test_file_include_expansion() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "shared.yml",
        "- model: shared\n  operations:\n    prepare: prepare.py",
    );
    write(
        temp.path(),
        "guild.yml",
        "- include: shared.yml\n- model: main\n  operations:\n    train: train.py",
    );
    let mut loader = Loader::new();
    let gf = loader.for_dir(temp.path(), false).unwrap();
    let names: Vec<&str> = gf.models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["shared", "main"]);
}

#[test]
fn test_included_config_usable_as_parent() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "base.yml",
        "- config: base\n  operations:\n    train:\n      main: train\n      flags:\n        lr: 0.1",
    );
    write(
        temp.path(),
        "guild.yml",
        "- include: base.yml\n- model: m\n  extends: base",
    );
    let mut loader = Loader::new();
    let gf = loader.for_dir(temp.path(), false).unwrap();
    let op = gf.model("m").unwrap().operation("train").unwrap();
    assert_eq!(op.flag_value("lr"), Some(&serde_yaml::from_str("0.1").unwrap()));
}

#[test]
fn test_include_cycle_is_error() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.yml", "- include: b.yml");
    write(temp.path(), "b.yml", "- include: a.yml");
    let mut loader = Loader::new();
    let err = loader.for_file(&temp.path().join("a.yml"), false).unwrap_err();
    let GuildfileError::Cycle { chain, .. } = err else {
        panic!("expected cycle error, got {err}");
    };
    assert_eq!(chain.len(), 3);
    assert_eq!(chain.first(), chain.last());
}

#[test]
fn test_include_not_found_is_error() {
    let temp = tempdir().unwrap();
    write(temp.path(), "guild.yml", "- include: nope.yml");
    let mut loader = Loader::new();
    let err = loader.for_dir(temp.path(), false).unwrap_err();
    assert!(matches!(err, GuildfileError::IncludeNotFound { .. }));
    assert!(err.to_string().contains("nope.yml"));
}

#[test]
fn test_dotted_include_on_search_path() {
    let temp = tempdir().unwrap();
    let pkgs = tempdir().unwrap();
    write(
        pkgs.path(),
        "common/guild.yml",
        "- config: defaults\n  flags:\n    seed: 42",
    );
    write(
        temp.path(),
        "guild.yml",
        "- include: common\n\
         - model: m\n\
         \x20 operations:\n\
         \x20   train:\n\
         \x20     main: train\n\
         \x20     flags:\n\
         \x20       $include: defaults",
    );
    let mut loader = Loader::new().with_search_path(vec![pkgs.path().to_path_buf()]);
    let gf = loader.for_dir(temp.path(), false).unwrap();
    let op = gf.model("m").unwrap().operation("train").unwrap();
    assert_eq!(op.flag_value("seed"), Some(&serde_yaml::from_str("42").unwrap()));
}

#[test]
fn test_gpkg_namespace_include() {
    let temp = tempdir().unwrap();
    let pkgs = tempdir().unwrap();
    write(
        pkgs.path(),
        "gpkg/common/guild.yml",
        "- config: defaults\n  flags:\n    seed: 42",
    );
    write(
        temp.path(),
        "guild.yml",
        "- include: common\n- model: m\n  operations:\n    run: run",
    );
    let mut loader = Loader::new().with_search_path(vec![pkgs.path().to_path_buf()]);
    let gf = loader.for_dir(temp.path(), false).unwrap();
    assert!(gf.model("m").is_some());
}

#[test]
fn test_package_extends_via_search_path() {
    let temp = tempdir().unwrap();
    let pkgs = tempdir().unwrap();
    write(
        pkgs.path(),
        "gpkg/mnist/guild.yml",
        "- config: base\n\
         \x20 operations:\n\
         \x20   train:\n\
         \x20     main: train\n\
         \x20     flags:\n\
         \x20       epochs: 5",
    );
    write(
        temp.path(),
        "guild.yml",
        "- model: my-mnist\n  extends: gpkg.mnist/base",
    );
    let mut loader = Loader::new().with_search_path(vec![pkgs.path().to_path_buf()]);
    let gf = loader.for_dir(temp.path(), false).unwrap();
    let model = gf.model("my-mnist").unwrap();
    let op = model.operation("train").unwrap();
    assert_eq!(op.flag_value("epochs"), Some(&serde_yaml::from_str("5").unwrap()));
    assert_eq!(model.parents.len(), 1);
}

#[test]
fn test_parent_guildfile_in_section_include_scope() {
    let temp = tempdir().unwrap();
    let pkgs = tempdir().unwrap();
    write(
        pkgs.path(),
        "gpkg/mnist/guild.yml",
        "- config: base\n\
         \x20 description: base model\n\
         - config: shared-flags\n\
         \x20 flags:\n\
         \x20   lr: 0.1",
    );
    write(
        temp.path(),
        "guild.yml",
        "- model: m\n\
         \x20 extends: gpkg.mnist/base\n\
         \x20 operations:\n\
         \x20   train:\n\
         \x20     main: train\n\
         \x20     flags:\n\
         \x20       $include: shared-flags",
    );
    let mut loader = Loader::new().with_search_path(vec![pkgs.path().to_path_buf()]);
    let gf = loader.for_dir(temp.path(), false).unwrap();
    let op = gf.model("m").unwrap().operation("train").unwrap();
    assert_eq!(op.flag_value("lr"), Some(&serde_yaml::from_str("0.1").unwrap()));
}

#[test]
fn test_missing_package_parent_is_error() {
    let temp = tempdir().unwrap();
    write(temp.path(), "guild.yml", "- model: m\n  extends: nope/base");
    let mut loader = Loader::new();
    let err = loader.for_dir(temp.path(), false).unwrap_err();
    assert!(err.to_string().contains("cannot find guildfile for package 'nope'"));
}

#[test]
fn test_for_string() {
    let mut loader = Loader::new();
    let gf = loader.for_string("train: train.py", None).unwrap();
    assert_eq!(gf.src.as_deref(), Some("<string>"));
    assert!(gf.models[0].operation("train").is_some());
}

#[test]
fn test_for_file_or_dir() {
    let temp = tempdir().unwrap();
    write(temp.path(), "guild.yml", "train: train.py");
    let mut loader = Loader::new();
    let via_dir = loader.for_file_or_dir(temp.path(), true).unwrap();
    let via_file = loader
        .for_file_or_dir(&temp.path().join("guild.yml"), true)
        .unwrap();
    assert_eq!(via_dir.models.len(), via_file.models.len());
}

#[test]
fn test_resolution_is_repeatable() {
    // A document with no unresolved references loads to the same graph
    // every time: resolving it again changes nothing observable.
    let doc = "\
- model: mnist
  description: digit classifier
  params:
    lr: 0.1
  operations:
    train:
      main: train
      flags:
        lr: '{{lr}}'
        epochs: 10
  resources:
    data:
      sources:
        - file: data.csv
          sha256: abc123";
    let mut loader = Loader::new();
    let first = loader.for_string(doc, None).unwrap();
    let second = loader.for_string(doc, None).unwrap();
    assert_eq!(format!("{first:?}"), format!("{second:?}"));
    let train = first.models[0].operation("train").unwrap();
    assert_eq!(train.flag_value("lr"), Some(&serde_yaml::Value::from(0.1)));
}

#[derive(Default)]
struct CountingHook {
    data_calls: Arc<AtomicUsize>,
    loaded_calls: Arc<AtomicUsize>,
}

impl GuildfileHook for CountingHook {
    fn guildfile_data(&self, _data: &mut serde_yaml::Value, _src: &str) {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn guildfile_loaded(&self, _guildfile: &guildfile::Guildfile) {
        self.loaded_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_hooks_run_per_load() {
    let temp = tempdir().unwrap();
    write(temp.path(), "guild.yml", "train: train.py");
    let hook = CountingHook::default();
    let data_calls = Arc::clone(&hook.data_calls);
    let loaded_calls = Arc::clone(&hook.loaded_calls);
    let mut loader = Loader::new().with_hook(Box::new(hook));

    loader.for_dir(temp.path(), false).unwrap();
    assert_eq!(data_calls.load(Ordering::SeqCst), 1);
    assert_eq!(loaded_calls.load(Ordering::SeqCst), 1);

    // Cache hit skips the hooks.
    loader.for_dir(temp.path(), false).unwrap();
    assert_eq!(data_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_for_run_guildfile_ref() {
    let run_dir = tempdir().unwrap();
    write(run_dir.path(), "guild.yml", "train: train.py");
    let run = RunRef {
        dir: run_dir.path().to_path_buf(),
        opref: OpRef {
            pkg_type: "guildfile".to_string(),
            pkg_name: "guild.yml".to_string(),
            pkg_version: String::new(),
            model_name: String::new(),
            op_name: "train".to_string(),
        },
    };
    let mut loader = Loader::new();
    let gf = loader.for_run(&run).unwrap();
    assert!(gf.models[0].operation("train").is_some());
}

#[test]
fn test_for_run_package_ref() {
    let pkgs = tempdir().unwrap();
    write(
        pkgs.path(),
        "mnist/guild.yml",
        "- model: mnist\n  operations:\n    train: t",
    );
    let run = RunRef {
        dir: pkgs.path().to_path_buf(),
        opref: OpRef {
            pkg_type: "package".to_string(),
            pkg_name: "mnist".to_string(),
            pkg_version: "1.0".to_string(),
            model_name: "mnist".to_string(),
            op_name: "train".to_string(),
        },
    };
    let mut loader = Loader::new().with_search_path(vec![pkgs.path().to_path_buf()]);
    let gf = loader.for_run(&run).unwrap();
    assert!(gf.model("mnist").is_some());
}

#[test]
fn test_for_run_unknown_pkg_type_is_error() {
    let run = RunRef {
        dir: std::env::temp_dir(),
        opref: OpRef {
            pkg_type: "script".to_string(),
            pkg_name: "x".to_string(),
            pkg_version: String::new(),
            model_name: String::new(),
            op_name: "run".to_string(),
        },
    };
    let err = Loader::new().for_run(&run).unwrap_err();
    assert!(err.to_string().contains("unsupported package type"));
}

#[test]
fn test_opref_attachment() {
    let mut loader = Loader::new();
    let gf = loader
        .for_string("- model: mnist\n  operations:\n    train: train.py", None)
        .unwrap();
    let mut op = gf.model("mnist").unwrap().operation("train").unwrap().clone();
    assert!(op.opref().is_none());
    op.set_modelref(ModelRef {
        pkg_type: "guildfile".to_string(),
        pkg_name: "guild.yml".to_string(),
        pkg_version: String::new(),
        model_name: "mnist".to_string(),
    });
    let opref = op.opref().unwrap();
    assert_eq!(opref.to_opspec(), "mnist:train");
}

#[test]
fn test_yaml_parse_error() {
    let temp = tempdir().unwrap();
    write(temp.path(), "guild.yml", "- model: [unclosed");
    let mut loader = Loader::new();
    let err = loader.for_dir(temp.path(), false).unwrap_err();
    assert!(matches!(err, GuildfileError::Parse { .. }));
}
