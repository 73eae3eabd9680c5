use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{Config, ConfigResolver, ToastDuration, ToastType};
use crate::notify::{DispatchError, DispatchOutcome, Notifier, ToastRequest};
use crate::overrides::EnvOverrides;
use crate::template::{Template, TemplateResolver};

pub const DEFAULT_DIR_NAME: &str = ".wsl-toast";

/// ~/.wsl-toast
pub fn default_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home.join(DEFAULT_DIR_NAME))
}

pub fn default_templates_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("templates").join("notifications")
}

/// 設定 → テンプレート → 通知 の流れをまとめたもの。
/// 設定とテンプレートのキャッシュはこのインスタンスが持つ。
#[derive(Debug)]
pub struct ToastBridge {
    config_dir: PathBuf,
    configs: ConfigResolver,
    templates: TemplateResolver,
    notifier: Notifier,
    overrides: EnvOverrides,
}

impl ToastBridge {
    pub fn new(config_dir: impl Into<PathBuf>, templates_dir: impl Into<PathBuf>, notifier: Notifier) -> Self {
        Self {
            config_dir: config_dir.into(),
            configs: ConfigResolver::new(),
            templates: TemplateResolver::new(templates_dir),
            notifier,
            overrides: EnvOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: EnvOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn configs(&mut self) -> &mut ConfigResolver {
        &mut self.configs
    }

    pub fn templates(&mut self) -> &mut TemplateResolver {
        &mut self.templates
    }

    /// config.json (キャッシュ経由) に環境変数の上書きを重ねた実効設定
    pub fn settings(&mut self) -> Config {
        let config = self.configs.load_config(&self.config_dir);
        self.overrides.apply(&config)
    }

    fn dispatch(&self, settings: &Config, request: ToastRequest) -> Result<DispatchOutcome, DispatchError> {
        if !settings.enabled() {
            debug!(title = %request.title, "Notifications disabled; skipping");
            return Ok(DispatchOutcome::Disabled);
        }
        self.notifier.dispatch(&request)
    }

    /// タイトルと本文をそのまま送る。type / duration 未指定なら設定値。
    pub fn send(
        &mut self,
        title: &str,
        message: &str,
        toast_type: Option<ToastType>,
        duration: Option<ToastDuration>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let settings = self.settings();
        let mut request = ToastRequest::from_config(title, message, &settings);
        if let Some(toast_type) = toast_type {
            request = request.with_type(toast_type);
        }
        if let Some(duration) = duration {
            request = request.with_duration(duration);
        }
        self.dispatch(&settings, request)
    }

    /// テンプレートを解決して送る。言語未指定なら設定の language。
    pub fn resolve_event(
        &mut self,
        key: &str,
        language: Option<&str>,
        placeholders: &HashMap<String, String>,
    ) -> Result<Template> {
        let settings = self.settings();
        let language = language.unwrap_or_else(|| settings.language()).to_string();
        let template = self
            .templates
            .get_notification_data(key, &language, placeholders)
            .with_context(|| format!("Failed to resolve template {key:?} ({language})"))?;
        Ok(template)
    }

    pub fn send_event(
        &mut self,
        key: &str,
        language: Option<&str>,
        placeholders: &HashMap<String, String>,
        toast_type: Option<ToastType>,
    ) -> Result<DispatchOutcome> {
        let template = self.resolve_event(key, language, placeholders)?;
        let outcome = self.send(&template.title, &template.message, toast_type, None)?;
        Ok(outcome)
    }
}
