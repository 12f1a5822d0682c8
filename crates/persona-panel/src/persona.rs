//! Personas that sit on the panel.
//!
//! A [`Persona`] is a named role with a behavioral description. The default
//! panel is the closed [`Expert`] enumeration; custom panels are built through
//! [`PersonaRegistry::new`], which enforces unique, non-blank names.

use crate::error::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A single panel member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name, unique within a registry.
    pub name: String,
    /// Role description embedded in every prompt for this persona.
    pub role_description: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, role_description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role_description: role_description.into(),
        }
    }
}

/// The built-in experts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expert {
    Psychiatrist,
    Counselor,
    Mentalist,
    Internist,
}

impl Expert {
    /// All experts in panel order.
    pub const ALL: [Expert; 4] = [
        Expert::Psychiatrist,
        Expert::Counselor,
        Expert::Mentalist,
        Expert::Internist,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Expert::Psychiatrist => "精神科医",
            Expert::Counselor => "カウンセラー",
            Expert::Mentalist => "メンタリスト",
            Expert::Internist => "内科医",
        }
    }

    pub fn role_description(&self) -> &'static str {
        match self {
            Expert::Psychiatrist => {
                "心の不調を医学的な観点から捉え、症状の整理と受診の目安を落ち着いて伝える精神科医です。"
            }
            Expert::Counselor => {
                "相談者の気持ちに寄り添い、傾聴を重ねながら考えや感情の整理を手伝うカウンセラーです。"
            }
            Expert::Mentalist => {
                "心理学の知見から行動や思考の癖を読み解き、明日から試せる具体的なヒントを示すメンタリストです。"
            }
            Expert::Internist => {
                "睡眠や食事など体の調子と心の関係に目を向け、身体面から助言する内科医です。"
            }
        }
    }

    pub fn persona(&self) -> Persona {
        Persona::new(self.name(), self.role_description())
    }
}

impl From<Expert> for Persona {
    fn from(expert: Expert) -> Self {
        expert.persona()
    }
}

impl fmt::Display for Expert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered set of panel personas.
///
/// Registration order is the enumeration order used for prompts, replies and
/// log rendering. A registry always holds at least one persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// Builds a registry, rejecting empty sets, blank fields and duplicate names.
    pub fn new(personas: Vec<Persona>) -> Result<Self> {
        if personas.is_empty() {
            return Err(PanelError::InvalidRegistry(
                "at least one persona is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for persona in &personas {
            if persona.name.trim().is_empty() {
                return Err(PanelError::InvalidRegistry(
                    "persona name must not be blank".to_string(),
                ));
            }
            if persona.role_description.trim().is_empty() {
                return Err(PanelError::InvalidRegistry(format!(
                    "persona '{}' has a blank role description",
                    persona.name
                )));
            }
            if !seen.insert(persona.name.as_str()) {
                return Err(PanelError::InvalidRegistry(format!(
                    "duplicate persona name '{}'",
                    persona.name
                )));
            }
        }

        Ok(Self { personas })
    }

    /// The four built-in experts.
    pub fn experts() -> Self {
        Self {
            personas: Expert::ALL.iter().map(Expert::persona).collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Persona> {
        self.personas.iter()
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::experts()
    }
}

impl<'a> IntoIterator for &'a PersonaRegistry {
    type Item = &'a Persona;
    type IntoIter = std::slice::Iter<'a, Persona>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
