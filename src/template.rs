//! 言語別の通知テンプレート (`<lang>.json`) の読み込みとプレースホルダ展開
//!
//! 要求された言語にファイルやキーがなければ英語 (`en.json`) にフォールバックする。
//! 英語にもなければ呼び出し元にエラーを返す。

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::json_io::{self, JsonFileError};

pub const FALLBACK_LANGUAGE: &str = "en";

/// 完全なテンプレートセットが持つべきキー
pub const REQUIRED_KEYS: &[&str] = &[
    "tool_completed",
    "tool_failed",
    "error_occurred",
    "session_start",
    "session_end",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub title: String,
    pub message: String,
}

pub type TemplateSet = BTreeMap<String, Template>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template key not found: {key}")]
    KeyNotFound { key: String },
    #[error("template file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("failed to parse template file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read template file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<JsonFileError> for TemplateError {
    fn from(err: JsonFileError) -> Self {
        match err {
            JsonFileError::NotFound(path) => TemplateError::FileNotFound(path),
            JsonFileError::Io { path, source } => TemplateError::Io { path, source },
            JsonFileError::Parse { path, source } => TemplateError::Parse { path, source },
            // read_json は NotObject を返さないが、型エラーとして扱う
            JsonFileError::NotObject(path) => TemplateError::Parse {
                path,
                source: serde::de::Error::custom("expected a JSON object"),
            },
        }
    }
}

/// ファイル名に使ってよい言語コードか ("en", "zh-TW", "pt_BR" など)
fn is_language_code(lang: &str) -> bool {
    !lang.is_empty()
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// `{name}` 形式のプレースホルダを置換する。
/// 対応する値がないものはそのまま残し、使われない値は無視する。
pub fn render_placeholders(text: &str, values: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// 言語ごとにキャッシュするテンプレートローダー
#[derive(Debug)]
pub struct TemplateResolver {
    base_dir: PathBuf,
    cache: HashMap<String, TemplateSet>,
}

impl TemplateResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn language_path(&self, lang: &str) -> PathBuf {
        self.base_dir.join(format!("{lang}.json"))
    }

    /// 言語のテンプレートセットを読み込む (フォールバックなし)。
    /// 壊れたファイルは Parse エラーになり、キャッシュされない。
    pub fn load_language(&mut self, lang: &str) -> Result<&TemplateSet, TemplateError> {
        if !is_language_code(lang) {
            return Err(TemplateError::FileNotFound(self.language_path(lang)));
        }

        match self.cache.entry(lang.to_string()) {
            Entry::Occupied(entry) => {
                debug!(lang, "Template cache hit");
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                let path = self.base_dir.join(format!("{lang}.json"));
                let set: TemplateSet = json_io::read_json(&path)?;
                debug!(lang, path = %path.display(), templates = set.len(), "Templates loaded");
                Ok(entry.insert(set))
            }
        }
    }

    /// (key, language) のテンプレートを解決する。
    ///
    /// 要求言語のファイルがない・読めない・壊れている・キーがない場合は英語を使う。
    /// 英語ファイルがなければ `FileNotFound`、英語にもキーがなければ `KeyNotFound`。
    pub fn get_template(&mut self, key: &str, language: &str) -> Result<Template, TemplateError> {
        if language != FALLBACK_LANGUAGE {
            match self.load_language(language) {
                Ok(set) => {
                    if let Some(template) = set.get(key) {
                        return Ok(template.clone());
                    }
                    debug!(key, language, "Template key missing, falling back to English");
                }
                Err(TemplateError::FileNotFound(_)) => {
                    debug!(language, "No template file, falling back to English");
                }
                Err(e) => {
                    warn!(error = %e, language, "Unusable template file, falling back to English");
                }
            }
        }

        self.load_language(FALLBACK_LANGUAGE)?
            .get(key)
            .cloned()
            .ok_or_else(|| TemplateError::KeyNotFound {
                key: key.to_string(),
            })
    }

    pub fn get_title(&mut self, key: &str, language: &str) -> Result<String, TemplateError> {
        Ok(self.get_template(key, language)?.title)
    }

    pub fn get_message(&mut self, key: &str, language: &str) -> Result<String, TemplateError> {
        Ok(self.get_template(key, language)?.message)
    }

    /// テンプレートを解決し、メッセージ中のプレースホルダを展開する
    pub fn get_notification_data(
        &mut self,
        key: &str,
        language: &str,
        placeholders: &HashMap<String, String>,
    ) -> Result<Template, TemplateError> {
        let template = self.get_template(key, language)?;
        Ok(Template {
            message: render_placeholders(&template.message, placeholders),
            ..template
        })
    }

    /// base_dir 内で読み込み可能な `<lang>.json` の言語コード一覧
    pub fn get_available_languages(&self) -> BTreeSet<String> {
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, dir = %self.base_dir.display(), "Template directory unreadable");
                return BTreeSet::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let lang = path.file_stem()?.to_str()?.to_string();
                if !is_language_code(&lang) {
                    return None;
                }
                if self.cache.contains_key(&lang) {
                    return Some(lang);
                }
                json_io::read_json::<TemplateSet>(&path).ok().map(|_| lang)
            })
            .collect()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_templates(dir: &Path, lang: &str, value: serde_json::Value) {
        fs::write(
            dir.join(format!("{lang}.json")),
            serde_json::to_string(&value).unwrap(),
        )
        .unwrap();
    }

    fn mock_templates() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_templates(
            dir.path(),
            "en",
            json!({
                "tool_completed": {"title": "Tool Completed", "message": "Tool finished successfully"},
                "tool_failed": {"title": "Tool Failed", "message": "Tool execution failed"},
            }),
        );
        write_templates(
            dir.path(),
            "ko",
            json!({
                "tool_completed": {"title": "도구 완료", "message": "도구가 성공적으로 완료되었습니다"},
                "tool_failed": {"title": "도구 실패", "message": "도구 실행이 실패했습니다"},
            }),
        );
        write_templates(
            dir.path(),
            "ja",
            json!({
                "tool_completed": {"title": "ツール完了", "message": "ツールが正常に完了しました"},
            }),
        );
        dir
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_template_for_language() {
        let dir = mock_templates();
        let mut resolver = TemplateResolver::new(dir.path());

        let template = resolver.get_template("tool_completed", "en").unwrap();
        assert_eq!(template.title, "Tool Completed");
        assert_eq!(template.message, "Tool finished successfully");

        assert!(resolver.get_title("tool_failed", "ko").unwrap().contains("실패"));
        assert_eq!(resolver.get_title("tool_completed", "ja").unwrap(), "ツール完了");
    }

    #[test]
    fn test_unsupported_language_falls_back_to_english() {
        let dir = mock_templates();
        let mut resolver = TemplateResolver::new(dir.path());

        for lang in ["fr", "de", "../en", ""] {
            let template = resolver.get_template("tool_completed", lang).unwrap();
            assert_eq!(template.title, "Tool Completed", "lang {lang:?}");
        }
    }

    #[test]
    fn test_missing_key_in_language_falls_back_to_english() {
        let dir = mock_templates();
        let mut resolver = TemplateResolver::new(dir.path());

        assert_eq!(
            resolver.get_message("tool_failed", "ja").unwrap(),
            "Tool execution failed"
        );
    }

    #[test]
    fn test_key_missing_everywhere_is_key_not_found() {
        let dir = mock_templates();
        let mut resolver = TemplateResolver::new(dir.path());

        for lang in ["en", "ko", "fr"] {
            let err = resolver.get_template("nonexistent_key", lang).unwrap_err();
            assert!(
                matches!(&err, TemplateError::KeyNotFound { key } if key == "nonexistent_key"),
                "lang {lang}: {err}"
            );
        }
    }

    #[test]
    fn test_fallback_without_english_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        write_templates(
            dir.path(),
            "ko",
            json!({"test_key": {"title": "Test", "message": "Test message"}}),
        );
        let mut resolver = TemplateResolver::new(dir.path());

        let err = resolver.get_template("test_key", "fr").unwrap_err();
        assert!(matches!(err, TemplateError::FileNotFound(path) if path.ends_with("en.json")));

        // ko 自体にあるキーは英語がなくても解決できる
        assert_eq!(resolver.get_title("test_key", "ko").unwrap(), "Test");
    }

    #[test]
    fn test_malformed_language_file_falls_back_to_healthy_english() {
        let dir = mock_templates();
        fs::write(dir.path().join("ko.json"), "{invalid json}").unwrap();
        let mut resolver = TemplateResolver::new(dir.path());

        let template = resolver.get_template("tool_completed", "ko").unwrap();
        assert_eq!(template.title, "Tool Completed");
    }

    #[test]
    fn test_malformed_language_file_is_parse_error_when_loaded_directly() {
        let dir = mock_templates();
        fs::write(dir.path().join("ko.json"), "{invalid json}").unwrap();
        let mut resolver = TemplateResolver::new(dir.path());

        let err = resolver.load_language("ko").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_malformed_language_file_without_english_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("invalid.json"), "{invalid json}").unwrap();
        let mut resolver = TemplateResolver::new(dir.path());

        let err = resolver.get_template("tool_completed", "invalid").unwrap_err();
        assert!(matches!(err, TemplateError::FileNotFound(_)));
    }

    #[test]
    fn test_malformed_english_is_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("en.json"), r#"{"tool_completed": {"title": 1}}"#).unwrap();
        let mut resolver = TemplateResolver::new(dir.path());

        let err = resolver.get_template("tool_completed", "en").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
        assert!(err.to_string().contains("en.json"));
    }

    #[test]
    fn test_load_missing_language_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let mut resolver = TemplateResolver::new(dir.path());

        assert!(matches!(
            resolver.load_language("missing").unwrap_err(),
            TemplateError::FileNotFound(_)
        ));
    }

    #[test]
    fn test_templates_are_cached_until_cleared() {
        let dir = mock_templates();
        let mut resolver = TemplateResolver::new(dir.path());

        let first = resolver.get_template("tool_completed", "en").unwrap();

        write_templates(
            dir.path(),
            "en",
            json!({"tool_completed": {"title": "Changed", "message": "Changed"}}),
        );
        assert_eq!(resolver.get_template("tool_completed", "en").unwrap(), first);

        resolver.clear_cache();
        assert_eq!(resolver.get_title("tool_completed", "en").unwrap(), "Changed");
    }

    #[test]
    fn test_notification_data_substitutes_placeholders() {
        let dir = TempDir::new().unwrap();
        write_templates(
            dir.path(),
            "en",
            json!({
                "test_key": {"title": "Test Title", "message": "Hello {name}, you have {count} notifications"},
                "plain": {"title": "Test", "message": "No placeholders here"},
            }),
        );
        let mut resolver = TemplateResolver::new(dir.path());

        let data = resolver
            .get_notification_data("test_key", "en", &vars(&[("name", "World"), ("count", "5")]))
            .unwrap();
        assert_eq!(data.title, "Test Title");
        assert_eq!(data.message, "Hello World, you have 5 notifications");

        let data = resolver
            .get_notification_data("plain", "en", &vars(&[("invalid_param", "value")]))
            .unwrap();
        assert_eq!(data.message, "No placeholders here");

        let data = resolver
            .get_notification_data("tool_completed_missing", "en", &HashMap::new())
            .unwrap_err();
        assert!(matches!(data, TemplateError::KeyNotFound { .. }));
    }

    #[test]
    fn test_render_placeholders_leaves_unknown_verbatim() {
        let rendered = render_placeholders(
            "{tool} finished in {elapsed}s {} {not-a-name}",
            &vars(&[("tool", "Bash")]),
        );
        assert_eq!(rendered, "Bash finished in {elapsed}s {} {not-a-name}");
    }

    #[test]
    fn test_render_placeholders_keeps_non_latin_text() {
        let rendered = render_placeholders("{name}님, 완료되었습니다", &vars(&[("name", "世界")]));
        assert_eq!(rendered, "世界님, 완료되었습니다");
    }

    #[test]
    fn test_get_available_languages() {
        let dir = mock_templates();
        fs::write(dir.path().join("broken.json"), "{nope").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let resolver = TemplateResolver::new(dir.path());

        let languages: Vec<String> = resolver.get_available_languages().into_iter().collect();
        assert_eq!(languages, vec!["en", "ja", "ko"]);
    }

    #[test]
    fn test_available_languages_of_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let resolver = TemplateResolver::new(dir.path().join("nope"));
        assert!(resolver.get_available_languages().is_empty());
    }
}
