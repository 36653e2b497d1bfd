use super::*;

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "genconfig_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn config() -> SinkConfig {
    SinkConfig {
        collection: "tiles".to_string(),
        size: 1,
        seed: 9,
        workers: 2,
        allow_duplicates: false,
    }
}

fn item(index: u64) -> CollectionItem {
    let p1 = PositionIndex::new(1).unwrap();
    let p3 = PositionIndex::new(3).unwrap();
    let mut key = CombinationKey::default();
    key.set(p1, Some("red".into()));
    key.set(p3, Some("hat".into()));

    let payload = TraitPayload::from_rgba8_premul(1, 1, vec![1, 2, 3, 255]).unwrap();
    let layers = key
        .trait_keys()
        .map(|k| ResolvedLayer {
            position: k.position,
            variant: k.variant,
            payload: payload.clone(),
            status: ResolveStatus::Loaded,
        })
        .collect();
    CollectionItem { index, key, layers }
}

#[test]
fn in_memory_sink_captures_items_in_order() {
    let mut sink = InMemorySink::new();
    assert!(sink.config().is_none());

    sink.begin(config()).unwrap();
    sink.push_item(&item(0)).unwrap();
    sink.push_item(&item(1)).unwrap();
    assert!(!sink.is_finished());
    sink.end().unwrap();

    assert!(sink.is_finished());
    assert_eq!(sink.config().map(|c| c.seed), Some(9));
    let indices: Vec<u64> = sink.items().iter().map(|i| i.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(sink.items()[0].layers.len(), 2);
}

#[test]
fn manifest_sink_writes_json_on_end() {
    let dir = temp_dir("manifest_sink");
    let path = dir.join("nested").join("manifest.json");

    let mut sink = ManifestSink::new(&path);
    sink.begin(config()).unwrap();
    sink.push_item(&item(0)).unwrap();
    assert!(!path.exists());
    sink.end().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let manifest: Manifest = serde_json::from_str(&text).unwrap();
    assert_eq!(Some(&manifest), sink.manifest());
    assert_eq!(manifest.collection, "tiles");
    assert_eq!(manifest.workers, 2);

    let entry = &manifest.items[0];
    assert_eq!(entry.combination, "1:red|2:-|3:hat|4:-|5:-|6:-|7:-|8:-|9:-");
    assert_eq!(entry.fingerprint.len(), 16);
    assert_eq!(entry.fingerprint, format!("{:016x}", item(0).key.fingerprint()));
    assert_eq!(entry.traits.len(), 2);
    assert_eq!(entry.traits[1].variant.as_str(), "hat");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn manifest_sink_requires_begin() {
    let mut sink = ManifestSink::new(temp_dir("manifest_unbegun").join("m.json"));
    assert!(sink.push_item(&item(0)).is_err());
    assert!(sink.end().is_err());
    assert!(!sink.path().exists());
}

#[test]
fn ensure_parent_dir_accepts_bare_file_names() {
    ensure_parent_dir(Path::new("manifest.json")).unwrap();

    let dir = temp_dir("ensure_parent");
    ensure_parent_dir(&dir.join("a").join("b.json")).unwrap();
    assert!(dir.join("a").is_dir());
    std::fs::remove_dir_all(&dir).ok();
}
