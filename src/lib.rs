pub mod bridge;
pub mod config;
pub mod json_io;
pub mod notify;
pub mod overrides;
pub mod template;

pub use bridge::ToastBridge;
pub use config::{Config, ConfigResolver};
pub use notify::{DispatchError, DispatchOutcome, Notifier, ToastRequest};
pub use template::{Template, TemplateError, TemplateResolver};
