//! Built-in adapter catalog with the fields each adapter needs.

use serde::Serialize;

pub const API_ADAPTER_ID: &str = "api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Core,
    Modular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdapterField {
    pub key: &'static str,
    pub label: &'static str,
    pub env_var: &'static str,
    pub required: bool,
    pub secret: bool,
    pub default_value: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdapterSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: AdapterKind,
    /// Cannot be disabled.
    pub required: bool,
    pub fields: &'static [AdapterField],
}

const fn field(
    key: &'static str,
    label: &'static str,
    env_var: &'static str,
    secret: bool,
) -> AdapterField {
    AdapterField {
        key,
        label,
        env_var,
        required: true,
        secret,
        default_value: None,
    }
}

pub static ADAPTER_CATALOG: &[AdapterSpec] = &[
    AdapterSpec {
        id: API_ADAPTER_ID,
        name: "API",
        description: "HTTP API used by the console",
        kind: AdapterKind::Core,
        required: true,
        fields: &[AdapterField {
            key: "port",
            label: "API port",
            env_var: "CIRIS_API_PORT",
            required: false,
            secret: false,
            default_value: Some("8080"),
        }],
    },
    AdapterSpec {
        id: "cli",
        name: "CLI",
        description: "Interactive command line",
        kind: AdapterKind::Core,
        required: false,
        fields: &[],
    },
    AdapterSpec {
        id: "discord",
        name: "Discord",
        description: "Discord bot",
        kind: AdapterKind::Core,
        required: false,
        fields: &[
            field("bot_token", "Bot token", "DISCORD_BOT_TOKEN", true),
            field("channel_id", "Channel ID", "DISCORD_CHANNEL_ID", false),
        ],
    },
    AdapterSpec {
        id: "reddit",
        name: "Reddit",
        description: "Reddit account integration",
        kind: AdapterKind::Core,
        required: false,
        fields: &[
            field("client_id", "Client ID", "CIRIS_REDDIT_CLIENT_ID", false),
            field("client_secret", "Client secret", "CIRIS_REDDIT_CLIENT_SECRET", true),
            field("username", "Username", "CIRIS_REDDIT_USERNAME", false),
            field("password", "Password", "CIRIS_REDDIT_PASSWORD", true),
        ],
    },
    AdapterSpec {
        id: "external_data_sql",
        name: "External SQL data",
        description: "Read-only SQL data source",
        kind: AdapterKind::Modular,
        required: false,
        fields: &[],
    },
    AdapterSpec {
        id: "geo_wisdom",
        name: "Geo wisdom",
        description: "Geographic lookups",
        kind: AdapterKind::Modular,
        required: false,
        fields: &[],
    },
    AdapterSpec {
        id: "weather_wisdom",
        name: "Weather wisdom",
        description: "Weather data",
        kind: AdapterKind::Modular,
        required: false,
        fields: &[],
    },
    AdapterSpec {
        id: "sensor_wisdom",
        name: "Sensor wisdom",
        description: "Home sensor data",
        kind: AdapterKind::Modular,
        required: false,
        fields: &[],
    },
];

pub fn find_adapter(id: &str) -> Option<&'static AdapterSpec> {
    ADAPTER_CATALOG.iter().find(|spec| spec.id == id)
}
