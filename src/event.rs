/*!
 * Hook events
 *
 * A `HookEvent` is one invocation of a lifecycle hook by the command runner.
 * The runner describes the invocation through `DEVSPACE_PLUGIN_*` variables;
 * the dev environment wrapper adds `DEVENV_*` variables.
 */

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use devtel_core_store::{Fields, FromFields, Record};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Value of the `event` field for every hook event
pub const EVENT_NAME: &str = "devspace_hook";

pub const STATUS_INFO: &str = "info";
pub const STATUS_ERROR: &str = "error";

pub const ENV_EVENT: &str = "DEVSPACE_PLUGIN_EVENT";
pub const ENV_EXECUTION_ID: &str = "DEVSPACE_PLUGIN_EXECUTION_ID";
pub const ENV_ERROR: &str = "DEVSPACE_PLUGIN_ERROR";
pub const ENV_COMMAND: &str = "DEVSPACE_PLUGIN_COMMAND";
pub const ENV_COMMAND_LINE: &str = "DEVSPACE_PLUGIN_COMMAND_LINE";
pub const ENV_COMMAND_FLAGS: &str = "DEVSPACE_PLUGIN_COMMAND_FLAGS";
pub const ENV_COMMAND_ARGS: &str = "DEVSPACE_PLUGIN_COMMAND_ARGS";

/// Command that triggered the hook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub line: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Dev environment details passed along with the hook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevenvInfo {
    /// `DEVENV_TYPE`, stored as `devenv.runtime`
    #[serde(rename = "runtime")]
    pub env_type: String,
    pub bin: String,
    pub version: String,
    pub kind_bin: String,
    pub devspace_bin: String,
    pub dev_deployment_profile: String,
    pub deploy_version: String,
    pub deploy_image_source: String,
    pub deploy_image_registry: String,
    pub deploy_dev_image_registry: String,
    pub deploy_box_image_registry: String,
    pub deploy_appname: String,
    pub deploy_use_devspace: bool,
    pub dev_skip_portforwarding: bool,
    pub dev_terminal: bool,
}

impl DevenvInfo {
    /// Read the `DEVENV_*` variables; flags are set by any non-empty value
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(name).unwrap_or_default();
        let flag = |name: &str| lookup(name).is_some_and(|v| !v.is_empty());

        Self {
            env_type: text("DEVENV_TYPE"),
            bin: text("DEVENV_BIN"),
            version: text("DEVENV_VERSION"),
            kind_bin: text("DEVENV_KIND_BIN"),
            devspace_bin: text("DEVENV_DEVSPACE_BIN"),
            dev_deployment_profile: text("DEVENV_DEV_DEPLOYMENT_PROFILE"),
            deploy_version: text("DEVENV_DEPLOY_VERSION"),
            deploy_image_source: text("DEVENV_DEPLOY_IMAGE_SOURCE"),
            deploy_image_registry: text("DEVENV_DEPLOY_IMAGE_REGISTRY"),
            deploy_dev_image_registry: text("DEVENV_DEPLOY_DEV_IMAGE_REGISTRY"),
            deploy_box_image_registry: text("DEVENV_DEPLOY_BOX_IMAGE_REGISTRY"),
            deploy_appname: text("DEVENV_DEPLOY_APPNAME"),
            deploy_use_devspace: flag("DEVENV_DEPLOY_USE_DEVSPACE"),
            dev_skip_portforwarding: flag("DEVENV_DEV_SKIP_PORTFORWARDING"),
            dev_terminal: flag("DEVENV_DEV_TERMINAL"),
        }
    }

    fn add_fields(&self, fields: &mut Fields) {
        fields.add("devenv.runtime", self.env_type.clone());
        fields.add("devenv.bin", self.bin.clone());
        fields.add("devenv.version", self.version.clone());
        fields.add("devenv.kind_bin", self.kind_bin.clone());
        fields.add("devenv.devspace_bin", self.devspace_bin.clone());
        fields.add(
            "devenv.dev_deployment_profile",
            self.dev_deployment_profile.clone(),
        );
        fields.add("devenv.deploy_version", self.deploy_version.clone());
        fields.add("devenv.deploy_image_source", self.deploy_image_source.clone());
        fields.add(
            "devenv.deploy_image_registry",
            self.deploy_image_registry.clone(),
        );
        fields.add(
            "devenv.deploy_dev_image_registry",
            self.deploy_dev_image_registry.clone(),
        );
        fields.add(
            "devenv.deploy_box_image_registry",
            self.deploy_box_image_registry.clone(),
        );
        fields.add("devenv.deploy_appname", self.deploy_appname.clone());
        fields.add("devenv.deploy_use_devspace", self.deploy_use_devspace);
        fields.add("devenv.dev_skip_portforwarding", self.dev_skip_portforwarding);
        fields.add("devenv.dev_terminal", self.dev_terminal);
    }
}

/// One lifecycle hook invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub event: String,

    #[serde(default)]
    pub hook: String,

    /// Shared by every hook of one runner invocation
    #[serde(default, deserialize_with = "non_empty")]
    pub execution_id: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub error: Option<String>,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub command: Option<CommandInfo>,

    #[serde(default)]
    pub devenv: Option<DevenvInfo>,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,

    #[serde(rename = "@timestamp", default)]
    pub timestamp_tag: Option<DateTime<Utc>>,

    /// Set on closing hooks whose opener was found
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

impl HookEvent {
    /// Event for `hook` at `timestamp` milliseconds
    pub fn new(hook: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event: EVENT_NAME.to_string(),
            hook: hook.into(),
            status: STATUS_INFO.to_string(),
            timestamp,
            timestamp_tag: Utc.timestamp_millis_opt(timestamp).single(),
            ..Default::default()
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        let execution_id = execution_id.into();
        self.execution_id = (!execution_id.is_empty()).then_some(execution_id);
        self
    }

    /// Attach an error message; the status follows it
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        if error.is_empty() {
            self.error = None;
            self.status = STATUS_INFO.to_string();
        } else {
            self.error = Some(error);
            self.status = STATUS_ERROR.to_string();
        }
        self
    }

    pub fn with_command(mut self, command: CommandInfo) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_devenv(mut self, devenv: DevenvInfo) -> Self {
        self.devenv = Some(devenv);
        self
    }

    /// Scrape the event from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup_at(lookup, Utc::now())
    }

    /// Scrape the event from `lookup`, stamped with `now`
    ///
    /// Malformed flag or argument lists are dropped; the rest of the event
    /// is still built.
    pub fn from_lookup_at<F>(lookup: F, now: DateTime<Utc>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| lookup(name).unwrap_or_default();
        let list = |name: &str| -> Vec<String> {
            lookup(name)
                .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
                .unwrap_or_default()
        };

        let command = CommandInfo {
            name: text(ENV_COMMAND),
            line: text(ENV_COMMAND_LINE),
            flags: list(ENV_COMMAND_FLAGS),
            args: list(ENV_COMMAND_ARGS),
        };

        let mut event = Self::new(text(ENV_EVENT), now.timestamp_millis())
            .with_execution_id(text(ENV_EXECUTION_ID))
            .with_error(text(ENV_ERROR))
            .with_command(command)
            .with_devenv(DevenvInfo::from_lookup(&lookup));
        event.timestamp_tag = Some(now);
        event
    }

    /// Key of a sibling hook from the same runner invocation
    pub fn key_for(&self, hook: &str) -> String {
        match self.execution_id.as_deref() {
            Some(id) => format!("{}_{}", id, hook),
            None => hook.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Record for HookEvent {
    fn key(&self) -> String {
        self.key_for(&self.hook)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new()
            .with("event", self.event.clone())
            .with("hook", self.hook.clone())
            .with(
                "execution_id",
                self.execution_id.clone().unwrap_or_default(),
            );

        if let Some(ref error) = self.error {
            fields.add("error", error.clone());
        }
        fields.add("status", self.status.clone());

        fields.add("timestamp", self.timestamp);
        if let Some(tag) = self.timestamp_tag {
            fields.add("@timestamp", tag.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        if let Some(duration) = self.duration_ms {
            fields.add("duration_ms", duration);
        }

        if let Some(ref command) = self.command {
            fields.add("command.name", command.name.clone());
            fields.add("command.line", command.line.clone());
            if !command.flags.is_empty() {
                fields.add("command.flags", command.flags.clone());
            }
            if !command.args.is_empty() {
                fields.add("command.args", command.args.clone());
            }
        }

        if let Some(ref devenv) = self.devenv {
            devenv.add_fields(&mut fields);
        }

        fields
    }
}

impl FromFields for HookEvent {
    fn from_fields(data: &Map<String, Value>) -> devtel_core_store::Result<Self> {
        Ok(serde_json::from_value(Value::Object(data.clone()))?)
    }
}
