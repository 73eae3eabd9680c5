//! 統合テスト: 同梱テンプレート (templates/notifications/*.json) の網羅性
//!
//! すべての言語が必須キーを持ち、各言語の文字で書かれていることを確認する。

use std::collections::HashMap;
use std::path::PathBuf;

use wsl_toast::template::{Template, TemplateResolver, REQUIRED_KEYS};

fn templates_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("templates")
        .join("notifications")
}

fn has_char_in(text: &str, ranges: &[(char, char)]) -> bool {
    text.chars()
        .any(|c| ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)))
}

#[test]
fn test_all_bundled_languages_available() {
    let resolver = TemplateResolver::new(templates_dir());
    let languages: Vec<String> = resolver.get_available_languages().into_iter().collect();
    assert_eq!(languages, vec!["en", "ja", "ko", "zh"]);
}

#[test]
fn test_every_language_has_required_keys() {
    let mut resolver = TemplateResolver::new(templates_dir());

    for lang in ["en", "ko", "ja", "zh"] {
        let set = resolver.load_language(lang).unwrap();
        for key in REQUIRED_KEYS {
            let template = set
                .get(*key)
                .unwrap_or_else(|| panic!("missing {key} in {lang}.json"));
            assert!(!template.title.is_empty(), "{lang}/{key} title");
            assert!(!template.message.is_empty(), "{lang}/{key} message");
        }
    }
}

#[test]
fn test_languages_share_the_same_keys() {
    let mut resolver = TemplateResolver::new(templates_dir());
    let english: Vec<String> = resolver.load_language("en").unwrap().keys().cloned().collect();

    for lang in ["ko", "ja", "zh"] {
        let keys: Vec<String> = resolver.load_language(lang).unwrap().keys().cloned().collect();
        assert_eq!(keys, english, "{lang}.json keys differ from en.json");
    }
}

#[test]
fn test_titles_are_localized() {
    let mut resolver = TemplateResolver::new(templates_dir());

    let title = |resolver: &mut TemplateResolver, lang: &str| {
        resolver.get_title("tool_completed", lang).unwrap()
    };

    assert!(title(&mut resolver, "en").contains("Tool"));
    let ko = title(&mut resolver, "ko");
    assert!(ko.contains("도구"));
    assert!(has_char_in(&ko, &[('\u{ac00}', '\u{d7a3}')]));
    let ja = title(&mut resolver, "ja");
    assert!(ja.contains("ツール"));
    assert!(has_char_in(&ja, &[('\u{3040}', '\u{30ff}'), ('\u{4e00}', '\u{9faf}')]));
    let zh = title(&mut resolver, "zh");
    assert!(zh.contains("工具"));
    assert!(has_char_in(&zh, &[('\u{4e00}', '\u{9fff}')]));
}

#[test]
fn test_placeholder_templates_render() {
    let mut resolver = TemplateResolver::new(templates_dir());
    let vars = HashMap::from([("tool".to_string(), "Bash".to_string())]);

    for lang in ["en", "ko", "ja", "zh"] {
        let Template { message, .. } = resolver
            .get_notification_data("permission_required", lang, &vars)
            .unwrap();
        assert!(message.contains("Bash"), "{lang}: {message}");
        assert!(!message.contains("{tool}"), "{lang}: {message}");
    }
}
