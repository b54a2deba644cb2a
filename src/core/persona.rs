//! The prompt registry: a fixed persona-to-instruction table.
//!
//! Personas are a closed enumeration constructed once at startup. Lookups
//! never fail; unknown keys degrade to [`PersonaKey::General`].

/// The closed set of personas the service ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonaKey {
    General,
    Sports,
    Medical,
    Java,
    AiInterview,
}

impl PersonaKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonaKey::General => "general",
            PersonaKey::Sports => "sports",
            PersonaKey::Medical => "medical",
            PersonaKey::Java => "java",
            PersonaKey::AiInterview => "ai-interview",
        }
    }

    /// Resolve a raw key, including documented aliases. Unknown keys fall
    /// back to `General` rather than erroring.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sports" | "cricket" => PersonaKey::Sports,
            "medical" => PersonaKey::Medical,
            "java" => PersonaKey::Java,
            "ai-interview" | "ai interview" => PersonaKey::AiInterview,
            _ => PersonaKey::General,
        }
    }
}

impl AsRef<str> for PersonaKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// A canned question offered on the chat surface for a persona.
#[derive(Debug, Clone)]
pub struct PresetPrompt {
    pub label: &'static str,
    pub question: &'static str,
}

#[derive(Debug, Clone)]
pub struct Persona {
    pub key: PersonaKey,
    pub display_name: &'static str,
    pub instruction: &'static str,
    pub presets: &'static [PresetPrompt],
}

const GENERAL_INSTRUCTION: &str = "\
You are a helpful general-purpose assistant. Answer any question clearly \
and concisely. Format every answer as a bullet list: each line of your \
reply must start with \"- \". Keep each bullet to a single self-contained \
point.";

const SPORTS_INSTRUCTION: &str = "\
You are a sports expert with deep knowledge of cricket, football, tennis \
and athletics history, rules, records and tactics. Only answer questions \
about sports; politely redirect anything else. Format every answer as a \
bullet list: each line of your reply must start with \"- \".";

const MEDICAL_INSTRUCTION: &str = "\
You are a medical information assistant. Provide general health \
information only: you are not a doctor and must not diagnose or \
prescribe. Always remind the user to consult a doctor for personal \
medical advice. Format every answer as a bullet list: each line of your \
reply must start with \"- \".";

const JAVA_INSTRUCTION: &str = "\
You are a senior Java engineer. Answer programming questions with \
idiomatic, modern Java; every code example you give must be written in \
Java, regardless of what language the question mentions. Format every \
answer as a bullet list: each line of your reply must start with \"- \".";

const AI_INTERVIEW_INSTRUCTION: &str = "\
You are an interview coach for AI and machine-learning roles. Answer the \
way a strong candidate would in an interview: precise definitions, \
trade-offs, and one concrete example per concept. Stay on AI/ML \
interview topics. Format every answer as a bullet list: each line of \
your reply must start with \"- \".";

const GENERAL_PRESETS: &[PresetPrompt] = &[
    PresetPrompt {
        label: "Plan my day",
        question: "Give me a simple structure for a productive work day.",
    },
    PresetPrompt {
        label: "Explain simply",
        question: "Explain how the internet works in simple terms.",
    },
];

const SPORTS_PRESETS: &[PresetPrompt] = &[
    PresetPrompt {
        label: "Cricket formats",
        question: "What are the differences between Test, ODI and T20 cricket?",
    },
    PresetPrompt {
        label: "Offside rule",
        question: "Explain the offside rule in football.",
    },
];

const MEDICAL_PRESETS: &[PresetPrompt] = &[
    PresetPrompt {
        label: "Flu basics",
        question: "What is the flu?",
    },
    PresetPrompt {
        label: "Better sleep",
        question: "What habits improve sleep quality?",
    },
];

const JAVA_PRESETS: &[PresetPrompt] = &[
    PresetPrompt {
        label: "Streams",
        question: "When should I use Java streams instead of loops?",
    },
    PresetPrompt {
        label: "Records",
        question: "What are Java records and when do they fit?",
    },
];

const AI_INTERVIEW_PRESETS: &[PresetPrompt] = &[
    PresetPrompt {
        label: "Bias vs variance",
        question: "Explain the bias-variance trade-off.",
    },
    PresetPrompt {
        label: "Transformers",
        question: "How does attention work in a transformer?",
    },
];

static PERSONAS: &[Persona] = &[
    Persona {
        key: PersonaKey::General,
        display_name: "General Assistant",
        instruction: GENERAL_INSTRUCTION,
        presets: GENERAL_PRESETS,
    },
    Persona {
        key: PersonaKey::Sports,
        display_name: "Sports Expert",
        instruction: SPORTS_INSTRUCTION,
        presets: SPORTS_PRESETS,
    },
    Persona {
        key: PersonaKey::Medical,
        display_name: "Medical Advisor",
        instruction: MEDICAL_INSTRUCTION,
        presets: MEDICAL_PRESETS,
    },
    Persona {
        key: PersonaKey::Java,
        display_name: "Java Mentor",
        instruction: JAVA_INSTRUCTION,
        presets: JAVA_PRESETS,
    },
    Persona {
        key: PersonaKey::AiInterview,
        display_name: "AI Interview Coach",
        instruction: AI_INTERVIEW_INSTRUCTION,
        presets: AI_INTERVIEW_PRESETS,
    },
];

/// Stateless lookup table mapping persona keys to system instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonaRegistry;

impl PersonaRegistry {
    pub fn new() -> Self {
        PersonaRegistry
    }

    pub fn list(&self) -> &'static [Persona] {
        PERSONAS
    }

    /// Exact-key match including aliases; unknown keys resolve to the
    /// `general` persona. Never fails.
    pub fn resolve(&self, raw_key: &str) -> &'static Persona {
        let key = PersonaKey::parse(raw_key);
        PERSONAS
            .iter()
            .find(|p| p.key == key)
            .unwrap_or(&PERSONAS[0])
    }

    pub fn instruction_for(&self, raw_key: &str) -> &'static str {
        self.resolve(raw_key).instruction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_fall_back_to_general() {
        let registry = PersonaRegistry::new();
        for raw in ["", "quantum", "SPORTSBALL", "doctor", "42"] {
            assert_eq!(registry.resolve(raw).key, PersonaKey::General, "{raw}");
            assert_eq!(registry.instruction_for(raw), GENERAL_INSTRUCTION);
        }
    }

    #[test]
    fn aliases_resolve_to_their_persona() {
        let registry = PersonaRegistry::new();
        assert_eq!(registry.resolve("cricket").key, PersonaKey::Sports);
        assert_eq!(registry.resolve("ai interview").key, PersonaKey::AiInterview);
        assert_eq!(registry.resolve("AI-Interview").key, PersonaKey::AiInterview);
        assert_eq!(registry.resolve(" sports ").key, PersonaKey::Sports);
    }

    #[test]
    fn every_instruction_mandates_bullet_formatting() {
        let registry = PersonaRegistry::new();
        for persona in registry.list() {
            assert!(
                persona.instruction.contains("bullet list"),
                "{} lacks bullet mandate",
                persona.key.as_str()
            );
            assert!(persona.instruction.contains("\"- \""));
        }
    }

    #[test]
    fn medical_instruction_carries_disclaimer() {
        let registry = PersonaRegistry::new();
        let instruction = registry.instruction_for("medical");
        assert!(instruction.contains("consult a doctor"));
        assert!(instruction.contains("not a doctor"));
    }

    #[test]
    fn java_is_the_only_language_mandating_persona() {
        let registry = PersonaRegistry::new();
        let mandating: Vec<_> = registry
            .list()
            .iter()
            .filter(|p| p.instruction.contains("must be written in Java"))
            .collect();
        assert_eq!(mandating.len(), 1);
        assert_eq!(mandating[0].key, PersonaKey::Java);
    }

    #[test]
    fn personas_expose_preset_prompts() {
        let registry = PersonaRegistry::new();
        for persona in registry.list() {
            assert!(!persona.presets.is_empty());
            for preset in persona.presets {
                assert!(!preset.label.is_empty());
                assert!(!preset.question.is_empty());
            }
        }
    }
}
