// Options loading unit tests over the public API
//
// This is the only test file that touches the KAGAMI_PROVIDER
// environment variable, and it does so inside a single test so parallel
// execution never observes a half-set process environment.

use kagami::config::{RawOptions, ResolvedOptions};

use tempfile::TempDir;

const SAMPLE: &str = r#"
provider: static

sizes: [320, 420, 768, 1024, 1200, 1600]

static:
  baseURL: /_img
  dir: pictures
  cacheDir: .cache/kagami
  clearCache: false

accept:
  - image/avif
  - image/webp

presets:
  - name: thumbnail
    modifiers:
      w: 320
      q: 70

intersectOptions:
  rootMargin: 50px

providers:
  twicpics:
    baseURL: https://demo.twic.pics
"#;

#[test]
fn test_sample_options_file_round_trips() {
    let raw: RawOptions = serde_yaml::from_str(SAMPLE).unwrap();

    assert_eq!(raw.provider.as_deref(), Some("static"));
    assert_eq!(raw.sizes.as_deref(), Some(&[320, 420, 768, 1024, 1200, 1600][..]));

    let static_ = raw.static_.as_ref().unwrap();
    assert_eq!(static_.base_url.as_deref(), Some("/_img"));
    assert_eq!(static_.dir.as_deref(), Some(std::path::Path::new("pictures")));
    assert_eq!(static_.clear_cache, Some(false));

    let presets = raw.presets.as_ref().unwrap();
    assert_eq!(presets[0].name, "thumbnail");

    let providers = raw.providers.as_ref().unwrap();
    assert_eq!(
        providers["twicpics"].base_url.as_deref(),
        Some("https://demo.twic.pics")
    );
}

#[test]
fn test_from_file_reads_and_parses() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kagami.yaml");
    std::fs::write(&path, SAMPLE).unwrap();

    let raw = RawOptions::from_file(&path).unwrap();
    assert_eq!(raw.provider.as_deref(), Some("static"));
}

#[test]
fn test_from_file_missing_file_names_path() {
    let err = RawOptions::from_file("definitely-not-here.yaml").unwrap_err();
    assert!(err.to_string().contains("definitely-not-here.yaml"));
}

#[test]
fn test_resolution_fills_every_field() {
    let raw: RawOptions = serde_yaml::from_str(SAMPLE).unwrap();
    let resolved =
        ResolvedOptions::resolve_with_provider_override(&raw, &RawOptions::default(), None);

    assert_eq!(resolved.provider, "static");
    assert_eq!(resolved.static_.base_url, "/_img");
    assert_eq!(resolved.static_.dir, std::path::PathBuf::from("pictures"));
    assert!(!resolved.static_.clear_cache);
    assert_eq!(resolved.accept, vec!["image/avif", "image/webp"]);
    assert_eq!(resolved.presets.len(), 1);
    assert_eq!(resolved.providers.len(), 1);
    assert!(resolved.intersect_options.contains_key("rootMargin"));
}

// Env manipulation stays in this one test. `resolve` reads the process
// environment; everything else in the suite goes through the pure
// `resolve_with_provider_override`.
#[test]
fn test_provider_env_var_overrides_options() {
    let raw: RawOptions = serde_yaml::from_str(SAMPLE).unwrap();

    std::env::set_var("KAGAMI_PROVIDER", "twicpics");
    let resolved = ResolvedOptions::resolve(&raw, &RawOptions::default());
    std::env::remove_var("KAGAMI_PROVIDER");

    assert_eq!(resolved.provider, "twicpics");

    // Without the variable the options value stands
    let resolved = ResolvedOptions::resolve(&raw, &RawOptions::default());
    assert_eq!(resolved.provider, "static");
}

#[test]
fn test_validate_passes_for_sample() {
    let raw: RawOptions = serde_yaml::from_str(SAMPLE).unwrap();
    let resolved =
        ResolvedOptions::resolve_with_provider_override(&raw, &RawOptions::default(), None);

    assert!(resolved.validate().is_ok());
}
