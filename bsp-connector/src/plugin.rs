//! Host-facing plugin metadata.

use serde::Serialize;

/// Plugin interface version understood by the host.
pub const PLUGIN_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub plugin_version: u32,
    pub name: &'static str,
    pub provider: &'static str,
    pub features: PluginFeatures,
    pub capabilities: Vec<CapabilityDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFeatures {
    /// The connector accepts audio fixtures as user input.
    pub audio_input: bool,
}

/// A capability group the host can offer a profile picker for.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
}

/// Metadata of this connector.
pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor {
        plugin_version: PLUGIN_VERSION,
        name: "Speech Synthesis & Recognition",
        provider: "Botium",
        features: PluginFeatures { audio_input: true },
        capabilities: vec![
            CapabilityDescriptor {
                name: "BSP_STT",
                label: "Speech Recognition Profile",
                kind: "speechrecognitionprofile",
                required: false,
            },
            CapabilityDescriptor {
                name: "BSP_TTS",
                label: "Speech Synthesis Profile",
                kind: "speechsynthesisprofile",
                required: false,
            },
        ],
    }
}
