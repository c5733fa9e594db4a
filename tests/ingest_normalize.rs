// tests/ingest_normalize.rs
use keyword_news_bot::ingest::{mentions_keyword, normalize_text};

#[test]
fn empty_is_ok() {
    assert_eq!(normalize_text(""), "");
}

#[test]
fn strips_html_and_unescapes() {
    let s = "<p>Giấy&nbsp;<b>Miza</b> &ldquo;tăng trưởng&rdquo;</p>";
    assert_eq!(normalize_text(s), r#"Giấy Miza "tăng trưởng""#);
}

#[test]
fn adjacent_tags_do_not_glue_words() {
    assert_eq!(normalize_text("Miza<br/>tuyển dụng"), "Miza tuyển dụng");
}

#[test]
fn folds_whitespace_and_nbsp() {
    let s = "A\u{00A0}\n\tB   C";
    assert_eq!(normalize_text(s), "A B C");
}

#[test]
fn length_cap_applies() {
    let s = "x".repeat(2_000);
    assert!(normalize_text(&s).chars().count() <= 1_500);
}

#[test]
fn keyword_match_ignores_case_and_diacritics_stay_significant() {
    assert!(mentions_keyword("GIẤY MIZA báo lãi", "giấy miza"));
    assert!(!mentions_keyword("Giay Miza", "giấy"));
}
