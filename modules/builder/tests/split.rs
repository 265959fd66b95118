use bomify_model::serialize::{serialize, Format};
use bomify_module_builder::builder::split_language_options;
use bomify_module_builder::options::split_output_file;
use bomify_module_builder::{DocBuilder, GenerateOptions};
use tokio_util::sync::CancellationToken;

/// Split mode over a project with Python and Node manifests: two output
/// files on disk, each carrying only its own ecosystem's packages.
#[test_log::test(tokio::test)]
async fn split_mode_writes_one_file_per_language() {
    // keep the ecosystem tools out of reach so the manifest fallbacks run
    let empty = std::env::temp_dir().join("bomify-no-tools");
    let _ = std::fs::create_dir_all(&empty);
    std::env::set_var("PATH", &empty);

    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("requirements.txt"), "requests==2.28.1\n").unwrap();
    std::fs::write(
        project.path().join("package.json"),
        r#"{"dependencies":{"lodash":"4.17.21"}}"#,
    )
    .unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir
        .path()
        .join("out.spdx.json")
        .to_string_lossy()
        .to_string();

    let opts = GenerateOptions {
        directories: vec![project.path().to_string_lossy().to_string()],
        process_python_modules: true,
        process_node_modules: true,
        name: "out".into(),
        ..Default::default()
    };

    let mut written = Vec::new();
    for (lang, lang_opts) in split_language_options(&opts) {
        let doc = DocBuilder::new()
            .generate(&lang_opts, CancellationToken::new())
            .await
            .unwrap();
        let out_file = split_output_file(&output, lang.label());
        std::fs::write(&out_file, serialize(&doc, Format::Json).unwrap()).unwrap();
        written.push(out_file);
    }

    let python_out = out_dir.path().join("out-python.spdx.json");
    let node_out = out_dir.path().join("out-node.spdx.json");
    assert!(python_out.exists(), "{written:?}");
    assert!(node_out.exists(), "{written:?}");

    let python_doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&python_out).unwrap()).unwrap();
    let node_doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&node_out).unwrap()).unwrap();

    let names = |doc: &serde_json::Value| -> Vec<String> {
        doc["packages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect()
    };

    let python_names = names(&python_doc);
    assert!(python_names.iter().any(|n| n == "requests"));
    assert!(!python_names.iter().any(|n| n == "lodash"));
    // the per-language document names carry the language suffix
    assert_eq!("out-python", python_doc["name"]);

    let node_names = names(&node_doc);
    assert!(node_names.iter().any(|n| n == "lodash"));
    assert!(!node_names.iter().any(|n| n == "requests"));
    assert_eq!("out-node", node_doc["name"]);
}
