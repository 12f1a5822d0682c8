//! Prompt construction for panel members.
//!
//! Every prompt is rendered from a fixed `minijinja` template. The initial and
//! continuation prompts share one template: an empty history simply omits the
//! history block, so a continuation over an empty log renders exactly the
//! initial prompt.

use crate::conversation::{ConversationLog, Utterance};
use crate::error::Result;
use crate::persona::{Persona, PersonaRegistry};
use minijinja::{Environment, context};

const PERSONA_TEMPLATE: &str = r#"あなたは「{{ persona.name }}」です。
{{ persona.role_description }}
{% if history %}

## これまでの会話
{{ history }}
{% endif %}

## 相談内容
{{ utterance }}

## 回答の指示
{{ persona.name }}の立場から、日本語で300〜400文字程度で回答してください。"#;

const PANEL_TEMPLATE: &str = r#"あなたたちは次の専門家からなる相談パネルです。
{% for persona in personas %}
- {{ persona.name }}: {{ persona.role_description }}
{% endfor %}
{% if history %}

## これまでの会話
{{ history }}
{% endif %}

## 相談内容
{{ utterance }}

## 回答の指示
それぞれの専門家の立場から、日本語で300〜400文字程度ずつ回答してください。
出力は次のキーだけを持つJSONオブジェクト1つにしてください: {{ names | join(", ") }}
各キーの値はその専門家の回答本文です。JSON以外の文字は出力しないでください。"#;

const SUMMARY_TEMPLATE: &str = r#"以下は相談者と専門家パネルとの会話です。

## これまでの会話
{{ history }}

## 指示
この会話の要点を、日本語で400文字程度に要約してください。"#;

/// Renders the text sent to the oracle.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        Self { env }
    }

    /// Prompt for a persona's first answer in a session.
    pub fn build_initial_prompt(&self, utterance: &Utterance, persona: &Persona) -> Result<String> {
        self.render_persona(utterance, persona, "")
    }

    /// Prompt for a persona's answer with the whole prior log embedded.
    pub fn build_continuation_prompt(
        &self,
        utterance: &Utterance,
        persona: &Persona,
        prior_log: &ConversationLog,
    ) -> Result<String> {
        self.render_persona(utterance, persona, &prior_log.render())
    }

    /// One shared prompt asking the whole panel to answer as a JSON object.
    pub fn build_panel_prompt(
        &self,
        utterance: &Utterance,
        registry: &PersonaRegistry,
        prior_log: &ConversationLog,
    ) -> Result<String> {
        let rendered = self.env.render_str(
            PANEL_TEMPLATE,
            context! {
                personas => registry.personas(),
                names => registry.names(),
                history => prior_log.render(),
                utterance => utterance.as_str(),
            },
        )?;
        Ok(rendered)
    }

    /// Prompt asking for a summary of the log.
    pub fn build_summary_prompt(&self, log: &ConversationLog) -> Result<String> {
        let rendered = self.env.render_str(
            SUMMARY_TEMPLATE,
            context! {
                history => log.render(),
            },
        )?;
        Ok(rendered)
    }

    fn render_persona(
        &self,
        utterance: &Utterance,
        persona: &Persona,
        history: &str,
    ) -> Result<String> {
        let rendered = self.env.render_str(
            PERSONA_TEMPLATE,
            context! {
                persona => persona,
                history => history,
                utterance => utterance.as_str(),
            },
        )?;
        Ok(rendered)
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
