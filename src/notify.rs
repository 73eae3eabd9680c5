//! PowerShell 経由で Windows のトースト通知を出す (fire-and-forget)
//!
//! プロセスの起動までは同期で確認し、表示の完了は待たない。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, Position, ToastDuration, ToastType};

pub const ENV_POWERSHELL: &str = "WSL_TOAST_POWERSHELL";

const POWERSHELL_CANDIDATES: &[&str] = &[
    "/mnt/c/Windows/System32/WindowsPowerShell/v1.0/powershell.exe",
    "/mnt/c/WINDOWS/System32/WindowsPowerShell/v1.0/powershell.exe",
];

/// トーストの送信元として使う AppUserModelID (Windows PowerShell)
const APP_ID: &str = r"{1AC14E77-02E7-4E5D-B744-2EB1AE5198B7}\WindowsPowerShell\v1.0\powershell.exe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastRequest {
    pub title: String,
    pub message: String,
    pub toast_type: ToastType,
    pub duration: ToastDuration,
    pub sound_enabled: bool,
    pub position: Position,
}

impl ToastRequest {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            toast_type: ToastType::default(),
            duration: ToastDuration::default(),
            sound_enabled: true,
            position: Position::default(),
        }
    }

    /// 設定の default_type / default_duration / sound_enabled / position を反映する
    pub fn from_config(title: impl Into<String>, message: impl Into<String>, config: &Config) -> Self {
        Self {
            toast_type: config.toast_type(),
            duration: config.duration(),
            sound_enabled: config.sound_enabled(),
            position: config.position(),
            ..Self::new(title, message)
        }
    }

    pub fn with_type(mut self, toast_type: ToastType) -> Self {
        self.toast_type = toast_type;
        self
    }

    pub fn with_duration(mut self, duration: ToastDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_sound(mut self, sound_enabled: bool) -> Self {
        self.sound_enabled = sound_enabled;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// PowerShell を起動した (表示結果は見ていない)
    Launched { pid: u32 },
    /// 設定で無効化されている
    Disabled,
    /// モックモード: 実行するはずだったコマンドライン
    Mocked { command: Vec<String> },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("PowerShell not found (set WSL_TOAST_POWERSHELL or add powershell.exe to PATH)")]
    NotifierMissing,
    #[error("notifier does not exist: {}", .0.display())]
    NotifierNotFound(PathBuf),
    #[error("permission denied launching {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("failed to launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    fn from_spawn(program: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => DispatchError::NotifierNotFound(program.to_path_buf()),
            ErrorKind::PermissionDenied => DispatchError::PermissionDenied(program.to_path_buf()),
            _ => DispatchError::Spawn {
                program: program.to_path_buf(),
                source,
            },
        }
    }
}

/// WSL_TOAST_POWERSHELL → PATH 上の powershell.exe → 既定のインストール先 の順に探す
pub fn detect_powershell() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(ENV_POWERSHELL).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }

    if let Ok(path) = which::which("powershell.exe") {
        return Some(path);
    }

    POWERSHELL_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

fn encode_utf8(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// `-EncodedCommand` 用 (UTF-16LE を base64)
pub fn encode_command(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

fn toast_duration_attr(duration: ToastDuration) -> &'static str {
    match duration {
        ToastDuration::Short | ToastDuration::Normal => "short",
        ToastDuration::Long => "long",
    }
}

fn audio_element(request: &ToastRequest) -> &'static str {
    if !request.sound_enabled {
        return r#"<audio silent="true"/>"#;
    }
    match request.toast_type {
        ToastType::Warning | ToastType::Error => {
            r#"<audio src="ms-winsoundevent:Notification.Reminder"/>"#
        }
        ToastType::Information | ToastType::Success => {
            r#"<audio src="ms-winsoundevent:Notification.Default"/>"#
        }
    }
}

/// トーストを表示する PowerShell スクリプトを組み立てる。
/// タイトルと本文は UTF-8 の base64 で埋め込み、PowerShell 側で復号・XML エスケープする。
pub fn build_script(request: &ToastRequest) -> String {
    let title = format!("{} {}", request.toast_type.icon(), request.title);
    let xml = format!(
        "<toast duration=\"{}\"><visual><binding template=\"ToastGeneric\"><text>$title</text><text>$message</text></binding></visual>{}</toast>",
        toast_duration_attr(request.duration),
        audio_element(request),
    );

    [
        "$ErrorActionPreference = 'Stop'".to_string(),
        "[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null".to_string(),
        "[Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom.XmlDocument, ContentType = WindowsRuntime] | Out-Null".to_string(),
        "function Decode([string]$s) { [System.Text.Encoding]::UTF8.GetString([System.Convert]::FromBase64String($s)) }".to_string(),
        format!(
            "$title = [System.Security.SecurityElement]::Escape((Decode '{}'))",
            encode_utf8(&title)
        ),
        format!(
            "$message = [System.Security.SecurityElement]::Escape((Decode '{}'))",
            encode_utf8(&request.message)
        ),
        "$xml = New-Object Windows.Data.Xml.Dom.XmlDocument".to_string(),
        format!("$xml.LoadXml(\"{}\")", xml.replace('"', "`\"")),
        "$toast = New-Object Windows.UI.Notifications.ToastNotification $xml".to_string(),
        format!(
            "[Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('{}').Show($toast)",
            APP_ID
        ),
    ]
    .join("\n")
}

pub fn command_args(request: &ToastRequest) -> Vec<String> {
    vec![
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-EncodedCommand".to_string(),
        encode_command(&build_script(request)),
    ]
}

/// 外部の通知プロセスを起動するだけのディスパッチャ
#[derive(Debug, Clone)]
pub struct Notifier {
    program: Option<PathBuf>,
    mock: bool,
}

impl Notifier {
    pub fn detect() -> Self {
        let program = detect_powershell();
        debug!(program = ?program, "PowerShell detection");
        Self {
            program,
            mock: false,
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            mock: false,
        }
    }

    pub fn mock() -> Self {
        Self {
            program: None,
            mock: true,
        }
    }

    fn log_request(request: &ToastRequest) {
        if request.position != Position::default() {
            debug!(position = %request.position, "Windows toasts cannot be positioned; ignoring");
        }
    }

    fn mocked(&self, request: &ToastRequest) -> DispatchOutcome {
        let program = self
            .program
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "powershell.exe".to_string());
        let mut command = vec![program];
        command.extend(command_args(request));
        info!(title = %request.title, toast_type = %request.toast_type, "Mock notification");
        DispatchOutcome::Mocked { command }
    }

    /// 通知プロセスを 1 回だけ起動して即座に戻る
    pub fn dispatch(&self, request: &ToastRequest) -> Result<DispatchOutcome, DispatchError> {
        Self::log_request(request);
        if self.mock {
            return Ok(self.mocked(request));
        }

        let program = self.program.as_deref().ok_or(DispatchError::NotifierMissing)?;
        let mut child = Command::new(program)
            .args(command_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DispatchError::from_spawn(program, e))?;

        let pid = child.id();
        info!(pid, title = %request.title, "Notification launched");

        // 終了を待つのは回収用スレッドだけ (ゾンビを残さない)
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(DispatchOutcome::Launched { pid })
    }

    /// tokio ランタイム上での起動版。プロセスの起動完了で戻る。
    pub async fn dispatch_async(
        &self,
        request: &ToastRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        Self::log_request(request);
        if self.mock {
            return Ok(self.mocked(request));
        }

        let program = self.program.as_deref().ok_or(DispatchError::NotifierMissing)?;
        let mut child = tokio::process::Command::new(program)
            .args(command_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DispatchError::from_spawn(program, e))?;

        let pid = child.id().unwrap_or_default();
        info!(pid, title = %request.title, "Notification launched");

        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(DispatchOutcome::Launched { pid })
    }
}
