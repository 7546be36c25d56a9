//! Catalog of gateway models offered in the model picker.
//!
//! The gateway is authoritative for which ids exist; this list only drives
//! the picker and the vision check for image attachments.

/// Static descriptor for one selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    /// Gateway model identifier, e.g. `"deepseek/deepseek-chat"`.
    pub id: &'static str,
    /// Display name shown in the picker.
    pub name: &'static str,
    pub description: &'static str,
    /// Accepts `image_url` content parts.
    pub vision: bool,
}

pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "z-ai/glm-4.5-air:free",
        name: "GLM 4.5 Air",
        description: "Fast general-purpose chat",
        vision: false,
    },
    ModelInfo {
        id: "deepseek/deepseek-r1-0528:free",
        name: "DeepSeek R1",
        description: "Step-by-step reasoning",
        vision: false,
    },
    ModelInfo {
        id: "tngtech/tng-r1t-chimera:free",
        name: "TNG R1T Chimera",
        description: "Reasoning hybrid",
        vision: false,
    },
    ModelInfo {
        id: "deepseek/deepseek-chat",
        name: "DeepSeek Chat",
        description: "Efficient coding and chat",
        vision: false,
    },
    ModelInfo {
        id: "qwen/qwen-2.5-vl-7b-instruct:free",
        name: "Qwen 2.5 VL",
        description: "Vision, slower but stable",
        vision: true,
    },
    ModelInfo {
        id: "openai/gpt-4o-mini",
        name: "GPT-4o Mini",
        description: "Vision, fast and inexpensive",
        vision: true,
    },
];

pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";

impl ModelInfo {
    /// Look up a catalog entry by gateway id.
    pub fn find(id: &str) -> Option<&'static ModelInfo> {
        MODELS.iter().find(|m| m.id == id)
    }

    /// Whether `id` is known to accept images. Unknown ids are assumed not to.
    pub fn supports_vision(id: &str) -> bool {
        Self::find(id).is_some_and(|m| m.vision)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_model_is_in_catalog() {
        assert!(ModelInfo::find(DEFAULT_MODEL).is_some());
    }

    #[test]
    fn vision_flag_is_per_model() {
        assert!(ModelInfo::supports_vision("openai/gpt-4o-mini"));
        assert!(!ModelInfo::supports_vision("deepseek/deepseek-chat"));
        assert!(!ModelInfo::supports_vision("someone/unknown-model"));
    }

    #[test]
    fn ids_are_unique() {
        for (i, a) in MODELS.iter().enumerate() {
            assert!(MODELS[i + 1..].iter().all(|b| b.id != a.id), "duplicate id {}", a.id);
        }
    }
}
