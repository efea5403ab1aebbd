//! Integration tests for runtime discovery and three-target builds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pto_core::fakes::{CompileCall, RecordingCompiler};
use pto_core::{Platform, PtoError, RuntimeBuilder, TargetType, Verbosity};

const BUILD_CONFIG: &str = r#"
[aicore]
include_dirs = ["../../platform/include", "runtime"]
source_dirs = ["aicore", "runtime"]

[aicpu]
include_dirs = ["runtime"]
source_dirs = ["aicpu", "runtime"]

[host]
include_dirs = ["runtime"]
source_dirs = ["host", "runtime", "./host"]
"#;

fn make_project(runtimes: &[&str]) -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    for name in runtimes {
        let dir = root.path().join("src").join("runtime").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("build_config.toml"), BUILD_CONFIG).unwrap();
    }
    root
}

fn builder(root: &Path, compiler: Arc<RecordingCompiler>) -> RuntimeBuilder {
    RuntimeBuilder::new(
        Platform::Simulator,
        Some(root.to_path_buf()),
        Verbosity::Silent,
        compiler,
    )
    .expect("builder construction failed")
}

#[test]
fn test_list_runtimes_sorted() {
    let root = make_project(&["tensormap_and_ringbuffer", "host_build_graph", "aicpu_build_graph"]);
    // directory without a build config is not a runtime
    std::fs::create_dir_all(root.path().join("src/runtime/common")).unwrap();

    let compiler = Arc::new(RecordingCompiler::new(Platform::Simulator));
    let builder = builder(root.path(), compiler);
    assert_eq!(
        builder.list_runtimes(),
        vec!["aicpu_build_graph", "host_build_graph", "tensormap_and_ringbuffer"]
    );
}

#[test]
fn test_list_runtimes_empty_project() {
    let root = tempfile::tempdir().unwrap();
    let compiler = Arc::new(RecordingCompiler::new(Platform::Hardware));
    let builder = builder(root.path(), compiler);
    assert!(builder.list_runtimes().is_empty());
}

#[tokio::test]
async fn test_build_unknown_runtime_never_compiles() {
    let root = make_project(&["host_build_graph"]);
    let compiler = Arc::new(RecordingCompiler::new(Platform::Simulator));
    let builder = builder(root.path(), compiler.clone());

    let err = builder.build("missing").await.unwrap_err();
    match err {
        PtoError::NotFound {
            what,
            name,
            available,
        } => {
            assert_eq!(what, "runtime");
            assert_eq!(name, "missing");
            assert_eq!(available, vec!["host_build_graph"]);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(compiler.calls().is_empty());
}

#[tokio::test]
async fn test_build_compiles_in_fixed_order_with_absolute_paths() {
    let root = make_project(&["host_build_graph"]);
    let compiler = Arc::new(RecordingCompiler::new(Platform::Simulator));
    let builder = builder(root.path(), compiler.clone());

    let artifacts = builder.build("host_build_graph").await.unwrap();
    assert_eq!(
        compiler.targets(),
        vec![TargetType::Aicore, TargetType::Aicpu, TargetType::Host]
    );
    assert_eq!(artifacts.aicore.target, TargetType::Aicore);
    assert_eq!(artifacts.aicpu.target, TargetType::Aicpu);
    assert_eq!(artifacts.host.target, TargetType::Host);

    let config_dir = root.path().join("src/runtime/host_build_graph");
    for call in compiler.calls() {
        let CompileCall::Target {
            target,
            include_dirs,
            source_dirs,
        } = call
        else {
            panic!("unexpected source compile");
        };
        for dir in include_dirs.iter().chain(source_dirs.iter()) {
            assert!(dir.is_absolute(), "{} is not absolute", dir.display());
            assert!(!dir.components().any(|c| c.as_os_str() == ".."));
        }
        if target == TargetType::Host {
            // "host" and "./host" collapse into one entry
            let expected: Vec<PathBuf> = vec![config_dir.join("host"), config_dir.join("runtime")];
            assert_eq!(source_dirs.len(), expected.len());
        }
        if target == TargetType::Aicore {
            assert!(include_dirs[0].ends_with("src/platform/include"));
        }
    }
}

#[tokio::test]
async fn test_build_returns_host_aicpu_aicore_tuple() {
    let root = make_project(&["host_build_graph"]);
    let compiler = Arc::new(RecordingCompiler::new(Platform::Simulator));
    let builder = builder(root.path(), compiler);

    let (host, aicpu, aicore) = builder.build("host_build_graph").await.unwrap().into_tuple();
    assert_eq!(aicore, b"a2a3sim:aicore#1");
    assert_eq!(aicpu, b"a2a3sim:aicpu#2");
    assert_eq!(host, b"a2a3sim:host#3");
}

#[tokio::test]
async fn test_aicpu_failure_aborts_without_partial_artifacts() {
    let root = make_project(&["host_build_graph"]);
    let compiler = Arc::new(RecordingCompiler::new(Platform::Simulator).failing_on(TargetType::Aicpu));
    let builder = builder(root.path(), compiler.clone());

    let err = builder.build("host_build_graph").await.unwrap_err();
    assert!(matches!(err, PtoError::CompileFailure { .. }));
    // host is never attempted once aicpu fails
    assert_eq!(compiler.targets(), vec![TargetType::Aicore, TargetType::Aicpu]);

    // a second attempt recompiles aicore from scratch
    let _ = builder.build("host_build_graph").await.unwrap_err();
    assert_eq!(
        compiler.targets(),
        vec![
            TargetType::Aicore,
            TargetType::Aicpu,
            TargetType::Aicore,
            TargetType::Aicpu
        ]
    );
}

#[tokio::test]
async fn test_each_build_is_fresh() {
    let root = make_project(&["host_build_graph"]);
    let compiler = Arc::new(RecordingCompiler::new(Platform::Simulator));
    let builder = builder(root.path(), compiler.clone());

    let first = builder.build("host_build_graph").await.unwrap();
    let second = builder.build("host_build_graph").await.unwrap();
    assert_ne!(first.aicore.bytes, second.aicore.bytes);
    assert_eq!(compiler.targets().len(), 6);
}

#[tokio::test]
async fn test_malformed_build_config_is_configuration_error() {
    let root = make_project(&["host_build_graph"]);
    std::fs::write(
        root.path().join("src/runtime/host_build_graph/build_config.toml"),
        "[aicore]\nsource_dirs = [\"a\"]\n",
    )
    .unwrap();
    let compiler = Arc::new(RecordingCompiler::new(Platform::Simulator));
    let builder = builder(root.path(), compiler.clone());

    let err = builder.build("host_build_graph").await.unwrap_err();
    assert!(matches!(err, PtoError::Configuration { .. }));
    assert!(compiler.calls().is_empty());
}
