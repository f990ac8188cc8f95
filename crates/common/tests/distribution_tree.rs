//! Integration tests for building and materializing the distribution tree

mod common;

use std::collections::BTreeSet;

use ::common::assembly::{AssemblyConfig, AssemblyError, PathConfig, TreeBuilder};
use ::common::bundler::{BundlingConfig, PaddingPolicy};
use ::common::export::{verify_archive, ExportConfig};
use serde_json::json;

const COUNTRY: &str = "v1/diagnosis-keys/country";

#[tokio::test]
async fn test_layout_and_indexes() {
    let keys = vec![
        common::key(1, "DE", common::yesterday(), 3),
        common::key(2, "FR", common::yesterday(), 3),
    ];
    let (_temp, root) = common::build_tree(
        BundlingConfig::default(),
        ExportConfig::default(),
        keys,
        Some(b"{\"risk\":1}".to_vec()),
    )
    .await;

    assert_eq!(common::read_index(&root.join("index")), vec![json!("v1")]);
    assert_eq!(
        common::read_index(&root.join(COUNTRY).join("index")),
        vec![json!("DE"), json!("FR")]
    );
    assert_eq!(
        common::read_index(&root.join(COUNTRY).join("DE/date/index")),
        vec![json!("2021-01-02")]
    );
    assert_eq!(
        common::read_index(&root.join(COUNTRY).join("DE/date/2021-01-02/hour/index")),
        vec![json!(3)]
    );
    assert!(root
        .join(COUNTRY)
        .join("DE/date/2021-01-02/hour/3/export.zip")
        .is_file());
    assert!(root.join("v1/configuration/app_config").is_file());
}

#[tokio::test]
async fn test_identical_input_builds_identical_tree() {
    let keys: Vec<_> = (0..20)
        .map(|i| common::key(i, if i % 2 == 0 { "DE" } else { "FR" }, common::yesterday(), u32::from(i % 4)))
        .collect();
    let bundling = BundlingConfig {
        min_keys_per_hour: 2,
        padding: PaddingPolicy::RoundUp { multiple: 8 },
        padding_seed: common::PADDING_SEED.into(),
        ..Default::default()
    };

    let mut reversed = keys.clone();
    reversed.reverse();

    let (_a, first) =
        common::build_tree(bundling.clone(), ExportConfig::default(), keys, None).await;
    let (_b, second) =
        common::build_tree(bundling, ExportConfig::default(), reversed, None).await;

    let first = common::files(&first);
    let second = common::files(&second);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_three_keys_below_floor_only_in_daily_archive() {
    let keys: Vec<_> = (1..=3)
        .map(|i| common::key(i, "DE", common::yesterday(), 5))
        .collect();
    let bundling = BundlingConfig {
        min_keys_per_hour: 5,
        padding: PaddingPolicy::MinimumCount { count: 10 },
        padding_seed: common::PADDING_SEED.into(),
        ..Default::default()
    };
    let (_temp, root) =
        common::build_tree(bundling, ExportConfig::default(), keys.clone(), None).await;
    let date_dir = root.join(COUNTRY).join("DE/date/2021-01-02");

    assert!(!date_dir.join("hour/5").exists());
    assert!(common::read_index(&date_dir.join("hour/index")).is_empty());

    let (_, public) = common::signer();
    let codec = common::codec(ExportConfig::default());
    let archive = std::fs::read(date_dir.join("export.zip")).unwrap();
    let verified = verify_archive(&archive, &codec, &public).unwrap();

    assert_eq!(verified.export.keys.len(), 10);
    assert_eq!((verified.export.batch_num, verified.export.batch_size), (1, 1));
    let exported: BTreeSet<_> = verified.export.keys.iter().map(|k| k.key_data.clone()).collect();
    for key in &keys {
        assert!(exported.contains(key.key_data().as_slice()));
    }
}

#[tokio::test]
async fn test_today_never_published() {
    let keys = vec![
        common::key(1, "DE", common::yesterday(), 1),
        common::key(2, "DE", common::today(), 1),
    ];
    let (_temp, root) =
        common::build_tree(BundlingConfig::default(), ExportConfig::default(), keys, None).await;

    assert_eq!(
        common::read_index(&root.join(COUNTRY).join("DE/date/index")),
        vec![json!("2021-01-02")]
    );

    let (_, public) = common::signer();
    let codec = common::codec(ExportConfig::default());
    for (path, bytes) in common::files(&root) {
        if !path.ends_with(".zip") {
            continue;
        }
        let verified = verify_archive(&bytes, &codec, &public).unwrap();
        assert!(verified.export.keys.iter().all(|k| k.key_data != vec![2u8; 16]), "{path}");
    }
}

#[tokio::test]
async fn test_every_archive_verifies() {
    let keys: Vec<_> = (0..9)
        .map(|i| common::key(i, "DE", common::yesterday(), u32::from(i)))
        .collect();
    let (_temp, root) = common::build_tree(
        BundlingConfig::default(),
        ExportConfig::default(),
        keys,
        Some(vec![1, 2, 3]),
    )
    .await;

    let (_, public) = common::signer();
    let codec = common::codec(ExportConfig::default());
    let mut archives = 0;
    for (path, bytes) in common::files(&root) {
        if path.ends_with(".zip") {
            verify_archive(&bytes, &codec, &public).unwrap();
            archives += 1;
        }
    }
    // one daily archive plus nine hourly ones
    assert_eq!(archives, 10);
}

#[tokio::test]
async fn test_indexes_list_exactly_their_siblings() {
    let keys: Vec<_> = (0..6)
        .map(|i| common::key(i, ["DE", "FR", "IT"][usize::from(i % 3)], common::yesterday(), 2))
        .collect();
    let (_temp, root) =
        common::build_tree(BundlingConfig::default(), ExportConfig::default(), keys, None).await;

    let indexes: Vec<_> = common::files(&root)
        .into_iter()
        .filter(|(path, _)| path.ends_with("index"))
        .collect();
    assert!(!indexes.is_empty());

    for (path, bytes) in indexes {
        let index_path = root.join(&path);
        let dir = index_path.parent().unwrap();
        let listed: BTreeSet<String> = serde_json::from_slice::<Vec<serde_json::Value>>(&bytes)
            .unwrap()
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        let on_disk: BTreeSet<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name != "index")
            .collect();
        assert_eq!(listed, on_disk, "{path}");
    }
}

#[tokio::test]
async fn test_large_bundle_is_split_into_signed_batches() {
    let keys: Vec<_> = (0..5)
        .map(|i| common::key(i, "DE", common::yesterday(), 0))
        .collect();
    let export = ExportConfig {
        max_keys_per_file: 2,
        ..Default::default()
    };
    let (_temp, root) =
        common::build_tree(BundlingConfig::default(), export.clone(), keys, None).await;
    let date_dir = root.join(COUNTRY).join("DE/date/2021-01-02");

    let (_, public) = common::signer();
    let codec = common::codec(export);
    let mut total = 0;
    for (num, name) in ["export.zip", "export-2.zip", "export-3.zip"].iter().enumerate() {
        let bytes = std::fs::read(date_dir.join(name)).unwrap();
        let verified = verify_archive(&bytes, &codec, &public).unwrap();
        assert_eq!(verified.export.batch_num as usize, num + 1);
        assert_eq!(verified.export.batch_size, 3);
        total += verified.export.keys.len();
    }
    assert_eq!(total, 5);
}

#[tokio::test]
async fn test_empty_input_builds_empty_but_valid_tree() {
    let bundling = BundlingConfig {
        supported_countries: vec!["DE".into()],
        ..Default::default()
    };
    let (_temp, root) =
        common::build_tree(bundling, ExportConfig::default(), Vec::new(), None).await;

    assert_eq!(
        common::read_index(&root.join(COUNTRY).join("index")),
        vec![json!("DE")]
    );
    assert!(common::read_index(&root.join(COUNTRY).join("DE/date/index")).is_empty());
}

#[test]
fn test_invalid_paths_abort_before_build() {
    let (signer, _) = common::signer();
    let config = AssemblyConfig {
        paths: PathConfig {
            country: String::new(),
            ..Default::default()
        },
        ..Default::default()
    };
    let result = TreeBuilder::new(
        config,
        common::codec(ExportConfig::default()),
        signer,
        common::today(),
    );
    assert!(matches!(result, Err(AssemblyError::InvalidConfig(_))));
}
