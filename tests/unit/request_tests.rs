// Locator grammar and key derivation over the public API

use rstest::rstest;

use kagami::{ImageRequest, OutputFormat, TransformKey, TransformParams};

fn params(
    width: Option<u32>,
    height: Option<u32>,
    quality: Option<u8>,
    format: Option<OutputFormat>,
) -> TransformParams {
    TransformParams {
        width,
        height,
        quality,
        format,
    }
}

#[rstest]
#[case::plain("/_img/logo.png", None, "/logo.png", params(None, None, None, None))]
#[case::nested("/_img/gallery/2024/pic.jpg", None, "/gallery/2024/pic.jpg", params(None, None, None, None))]
#[case::options_segment(
    "/_img/w:300,q:80/logo.png",
    None,
    "/logo.png",
    params(Some(300), None, Some(80), None)
)]
#[case::query(
    "/_img/logo.png",
    Some("w=300&f=webp"),
    "/logo.png",
    params(Some(300), None, None, Some(OutputFormat::WebP))
)]
#[case::segment_wins_field_wise(
    "/_img/w:300/logo.png",
    Some("w=900&h=100"),
    "/logo.png",
    params(Some(300), Some(100), None, None)
)]
#[case::encoded_source(
    "/_img/caf%C3%A9.png",
    None,
    "/café.png",
    params(None, None, None, None)
)]
fn test_locator_grammar(
    #[case] path: &str,
    #[case] query: Option<&str>,
    #[case] source: &str,
    #[case] expected: TransformParams,
) {
    let request = ImageRequest::parse(path, query, "/_img").unwrap().unwrap();
    assert_eq!(request.source, source);
    assert_eq!(request.params, expected);
}

#[rstest]
#[case::bare_prefix("/_img", None)]
#[case::empty_source("/_img/", None)]
#[case::options_without_source("/_img/w:300", None)]
#[case::zero_width("/_img/w:0/logo.png", None)]
#[case::quality_over_100("/_img/logo.png", Some("q=101"))]
#[case::unknown_format("/_img/logo.png", Some("f=bmp"))]
fn test_locator_rejects(#[case] path: &str, #[case] query: Option<&str>) {
    assert!(ImageRequest::parse(path, query, "/_img").is_err());
}

#[rstest]
#[case::root("/")]
#[case::other_route("/api/users")]
#[case::prefix_sibling("/_imgs/logo.png")]
fn test_foreign_paths_pass_through(#[case] path: &str) {
    assert_eq!(ImageRequest::parse(path, None, "/_img").unwrap(), None);
}

#[test]
fn test_provider_query_parameter_is_extracted() {
    let request = ImageRequest::parse("/_img/logo.png", Some("provider=twicpics"), "/_img")
        .unwrap()
        .unwrap();
    assert_eq!(request.provider.as_deref(), Some("twicpics"));
}

#[test]
fn test_both_grammars_derive_the_same_key() {
    let from_segment = ImageRequest::parse("/_img/w:300,q:80/logo.png", None, "/_img")
        .unwrap()
        .unwrap();
    let from_query = ImageRequest::parse("/_img/logo.png", Some("w=300&q=80"), "/_img")
        .unwrap()
        .unwrap();

    let a = TransformKey::new("static", &from_segment.source, &from_segment.params);
    let b = TransformKey::new("static", &from_query.source, &from_query.params);

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.etag(), b.etag());
}

#[test]
fn test_key_file_name_follows_format() {
    let converted = TransformKey::new(
        "static",
        "/logo.png",
        &params(Some(300), None, None, Some(OutputFormat::WebP)),
    );
    assert!(converted.file_name().ends_with(".webp"));

    let preserved = TransformKey::new("static", "/logo.png", &params(Some(300), None, None, None));
    assert!(preserved.file_name().ends_with(".png"));
}

#[test]
fn test_path_segment_rendering_round_trips() {
    let original = params(Some(300), Some(200), Some(80), Some(OutputFormat::Avif));
    let rendered = original.to_path_segment();

    assert_eq!(rendered, "w:300,h:200,q:80,f:avif");
    assert_eq!(TransformParams::from_path_segment(&rendered).unwrap(), original);
}
