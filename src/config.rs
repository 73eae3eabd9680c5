use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::json_io::{self, JsonFileError};

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const KEY_ENABLED: &str = "enabled";
pub const KEY_DEFAULT_TYPE: &str = "default_type";
pub const KEY_DEFAULT_DURATION: &str = "default_duration";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_SOUND_ENABLED: &str = "sound_enabled";
pub const KEY_POSITION: &str = "position";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {setting} value: {value:?}")]
pub struct ParseSettingError {
    pub setting: &'static str,
    pub value: String,
}

/// 列挙型の設定値。JSON 上の綴りと Rust の variant を 1 対 1 で対応させる。
macro_rules! setting_enum {
    ($(#[$meta:meta])* $name:ident ($setting:literal) { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseSettingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseSettingError {
                        setting: $setting,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

setting_enum! {
    /// 通知の種類
    ToastType ("default_type") {
        Information => "Information",
        Warning => "Warning",
        Error => "Error",
        Success => "Success",
    }
}

setting_enum! {
    /// 通知の表示時間
    ToastDuration ("default_duration") {
        Short => "Short",
        Normal => "Normal",
        Long => "Long",
    }
}

setting_enum! {
    /// テンプレートが同梱されている言語
    Language ("language") {
        En => "en",
        Ko => "ko",
        Ja => "ja",
        Zh => "zh",
    }
}

setting_enum! {
    /// 表示位置
    Position ("position") {
        TopRight => "top_right",
        TopLeft => "top_left",
        BottomRight => "bottom_right",
        BottomLeft => "bottom_left",
    }
}

impl Default for ToastType {
    fn default() -> Self {
        ToastType::Information
    }
}

impl Default for ToastDuration {
    fn default() -> Self {
        ToastDuration::Normal
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::TopRight
    }
}

impl ToastType {
    pub fn icon(&self) -> &'static str {
        match self {
            ToastType::Information => "\u{2139}\u{fe0f}",
            ToastType::Warning => "\u{26a0}\u{fe0f}",
            ToastType::Error => "\u{274c}",
            ToastType::Success => "\u{2705}",
        }
    }
}

/// config.json の内容。既知キー以外もそのまま保持する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(Map<String, Value>);

impl Default for Config {
    fn default() -> Self {
        get_default_config()
    }
}

impl From<Map<String, Value>> for Config {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Config {
    /// 空の (部分) 設定。デフォルト値は含まない。
    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn enabled(&self) -> bool {
        self.bool_or_default(KEY_ENABLED)
    }

    pub fn sound_enabled(&self) -> bool {
        self.bool_or_default(KEY_SOUND_ENABLED)
    }

    pub fn toast_type(&self) -> ToastType {
        self.choice_or_default(KEY_DEFAULT_TYPE)
    }

    pub fn duration(&self) -> ToastDuration {
        self.choice_or_default(KEY_DEFAULT_DURATION)
    }

    pub fn position(&self) -> Position {
        self.choice_or_default(KEY_POSITION)
    }

    /// 言語コード。サポート外のコードもそのまま返す (テンプレート側で en にフォールバック)。
    pub fn language(&self) -> &str {
        self.get(KEY_LANGUAGE)
            .and_then(Value::as_str)
            .unwrap_or_else(|| Language::default().as_str())
    }

    fn bool_or_default(&self, key: &str) -> bool {
        match self.get(key).and_then(Value::as_bool) {
            Some(value) => value,
            None => get_default_config()
                .get(key)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    fn choice_or_default<T: FromStr + Default>(&self, key: &str) -> T {
        let raw = self.get(key).and_then(Value::as_str);
        match raw.map(str::parse::<T>) {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                warn!(key, value = raw.unwrap_or_default(), "Invalid setting, using default");
                T::default()
            }
            None => T::default(),
        }
    }
}

/// 組み込みのデフォルト設定
pub fn get_default_config() -> Config {
    let mut config = Config::empty();
    config.set(KEY_ENABLED, true);
    config.set(KEY_DEFAULT_TYPE, ToastType::default().as_str());
    config.set(KEY_DEFAULT_DURATION, ToastDuration::default().as_str());
    config.set(KEY_LANGUAGE, Language::default().as_str());
    config.set(KEY_SOUND_ENABLED, true);
    config.set(KEY_POSITION, Position::default().as_str());
    config
}

pub fn get_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

pub fn config_exists(dir: &Path) -> bool {
    get_config_path(dir).is_file()
}

/// base に override を上書きした新しい設定を返す
pub fn merge_config(base: &Config, overrides: &Config) -> Config {
    let mut merged = base.clone();
    for (key, value) in overrides.as_map() {
        merged.set(key.clone(), value.clone());
    }
    merged
}

/// 保存されている設定をそのまま読む (デフォルトとはマージしない)。
/// ファイルがなければ `Ok(None)`。
pub fn read_persisted(dir: &Path) -> Result<Option<Config>, JsonFileError> {
    match json_io::read_json_object(&get_config_path(dir)) {
        Ok(map) => Ok(Some(Config::from(map))),
        Err(JsonFileError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    NotAllowed {
        key: String,
        value: String,
        allowed: &'static [&'static str],
    },
}

impl ConfigIssue {
    pub fn key(&self) -> &str {
        match self {
            ConfigIssue::WrongType { key, .. } | ConfigIssue::NotAllowed { key, .. } => key,
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::WrongType {
                key,
                expected,
                found,
            } => write!(f, "{key}: expected {expected}, found {found}"),
            ConfigIssue::NotAllowed {
                key,
                value,
                allowed,
            } => write!(
                f,
                "{key}: invalid value {value:?} (allowed: {})",
                allowed.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(Vec<ConfigIssue>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            Validation::Valid => &[],
            Validation::Invalid(issues) => issues,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_bool(config: &Config, key: &str, issues: &mut Vec<ConfigIssue>) {
    if let Some(value) = config.get(key) {
        if !value.is_boolean() {
            issues.push(ConfigIssue::WrongType {
                key: key.to_string(),
                expected: "boolean",
                found: json_type_name(value),
            });
        }
    }
}

fn check_choice(
    config: &Config,
    key: &str,
    allowed: &'static [&'static str],
    issues: &mut Vec<ConfigIssue>,
) {
    match config.get(key) {
        None => {}
        Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
        Some(Value::String(s)) => issues.push(ConfigIssue::NotAllowed {
            key: key.to_string(),
            value: s.clone(),
            allowed,
        }),
        Some(other) => issues.push(ConfigIssue::WrongType {
            key: key.to_string(),
            expected: "string",
            found: json_type_name(other),
        }),
    }
}

/// 既知キーの型と値を検証する。欠けているキーや未知のキーはエラーにしない。
pub fn validate_config(config: &Config) -> Validation {
    let mut issues = Vec::new();

    check_bool(config, KEY_ENABLED, &mut issues);
    check_choice(config, KEY_DEFAULT_TYPE, ToastType::NAMES, &mut issues);
    check_choice(config, KEY_DEFAULT_DURATION, ToastDuration::NAMES, &mut issues);
    check_choice(config, KEY_LANGUAGE, Language::NAMES, &mut issues);
    check_bool(config, KEY_SOUND_ENABLED, &mut issues);
    check_choice(config, KEY_POSITION, Position::NAMES, &mut issues);

    if issues.is_empty() {
        Validation::Valid
    } else {
        Validation::Invalid(issues)
    }
}

/// ディレクトリごとの設定キャッシュ付きローダー
#[derive(Debug, Default)]
pub struct ConfigResolver {
    cache: HashMap<PathBuf, Config>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// dir/config.json を読み込み、デフォルトに重ねる。
    /// 読めない・壊れている場合はデフォルトを返す (warn ログのみ)。
    /// 結果は dir ごとにキャッシュされ、clear_config_cache まで再読込しない。
    pub fn load_config(&mut self, dir: &Path) -> Config {
        if let Some(config) = self.cache.get(dir) {
            debug!(dir = %dir.display(), "Config cache hit");
            return config.clone();
        }

        let defaults = get_default_config();
        let config = match read_persisted(dir) {
            Ok(Some(persisted)) => merge_config(&defaults, &persisted),
            Ok(None) => defaults,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable config, using defaults");
                defaults
            }
        };

        self.cache.insert(dir.to_path_buf(), config.clone());
        config
    }

    pub fn clear_config_cache(&mut self) {
        self.cache.clear();
    }

    /// キーの値を返す。設定になければ `default`。
    /// 既知キーは load_config の時点でデフォルトが入っているため常に Some。
    pub fn get_config_value(
        &mut self,
        key: &str,
        dir: &Path,
        default: Option<Value>,
    ) -> Option<Value> {
        self.load_config(dir).get(key).cloned().or(default)
    }

    /// 保存済みの値を読み、key だけ書き換えて保存する。値は検証しない。
    pub fn set_config_value(&mut self, key: &str, value: Value, dir: &Path) -> Result<()> {
        let mut persisted = read_persisted(dir)
            .with_context(|| format!("Refusing to overwrite unreadable config in {:?}", dir))?
            .unwrap_or_else(Config::empty);

        persisted.set(key, value);
        self.write(&persisted, dir)
    }

    pub fn save_config(&mut self, config: &Config, dir: &Path) -> Result<()> {
        self.write(config, dir)
    }

    /// 保存ファイルをデフォルトで上書きする
    pub fn reset_config(&mut self, dir: &Path) -> Result<()> {
        self.write(&get_default_config(), dir)
    }

    fn write(&mut self, config: &Config, dir: &Path) -> Result<()> {
        let path = get_config_path(dir);
        json_io::write_json_pretty(&path, config)
            .with_context(|| format!("Failed to save config: {:?}", path))?;
        self.cache.remove(dir);
        debug!(path = %path.display(), "Config written");
        Ok(())
    }
}
