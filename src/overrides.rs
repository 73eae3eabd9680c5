use tracing::warn;

use crate::config::{
    merge_config, Config, KEY_DEFAULT_DURATION, KEY_DEFAULT_TYPE, KEY_ENABLED, KEY_LANGUAGE,
};

pub const ENV_ENABLED: &str = "WSL_TOAST_ENABLED";
pub const ENV_TYPE: &str = "WSL_TOAST_TYPE";
pub const ENV_DURATION: &str = "WSL_TOAST_DURATION";
pub const ENV_LANGUAGE: &str = "WSL_TOAST_LANGUAGE";

/// 環境変数による上書き。解決済みの設定の一番外側に重ねる。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub enabled: Option<bool>,
    pub toast_type: Option<String>,
    pub duration: Option<String>,
    pub language: Option<String>,
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から組み立てる (テストでは環境変数を触らない)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let enabled = text(ENV_ENABLED).and_then(|raw| {
            let parsed = parse_flag(&raw);
            if parsed.is_none() {
                warn!(var = ENV_ENABLED, value = %raw, "Ignoring unrecognized boolean override");
            }
            parsed
        });

        Self {
            enabled,
            toast_type: text(ENV_TYPE),
            duration: text(ENV_DURATION),
            language: text(ENV_LANGUAGE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn as_config(&self) -> Config {
        let mut overlay = Config::empty();
        if let Some(enabled) = self.enabled {
            overlay.set(KEY_ENABLED, enabled);
        }
        if let Some(toast_type) = &self.toast_type {
            overlay.set(KEY_DEFAULT_TYPE, toast_type.as_str());
        }
        if let Some(duration) = &self.duration {
            overlay.set(KEY_DEFAULT_DURATION, duration.as_str());
        }
        if let Some(language) = &self.language {
            overlay.set(KEY_LANGUAGE, language.as_str());
        }
        overlay
    }

    pub fn apply(&self, config: &Config) -> Config {
        merge_config(config, &self.as_config())
    }
}
