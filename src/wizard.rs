use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::catalog::{DEFAULT_COUNTRY, DEFAULT_LANGUAGE};

pub const MIN_WORDS_PER_H2: u32 = 300;
pub const MIN_WORDS_PER_H3: u32 = 150;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WizardPage {
    #[default]
    #[serde(rename = "User Input Form")]
    UserInputForm,
    #[serde(rename = "Article Configuration")]
    ArticleConfiguration,
    #[serde(rename = "Article Display")]
    ArticleDisplay,
}

impl WizardPage {
    pub fn label(&self) -> &'static str {
        match self {
            WizardPage::UserInputForm => "User Input Form",
            WizardPage::ArticleConfiguration => "Article Configuration",
            WizardPage::ArticleDisplay => "Article Display",
        }
    }
}

impl fmt::Display for WizardPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
pub enum Tone {
    #[default]
    #[serde(rename = "SEO Optimized")]
    SeoOptimized,
    Casual,
    Excited,
    Formal,
    Friendly,
    Humorous,
    Professional,
}

impl Tone {
    pub const ALL: [Tone; 7] = [
        Tone::SeoOptimized,
        Tone::Casual,
        Tone::Excited,
        Tone::Formal,
        Tone::Friendly,
        Tone::Humorous,
        Tone::Professional,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Tone::SeoOptimized => "SEO Optimized",
            Tone::Casual => "Casual",
            Tone::Excited => "Excited",
            Tone::Formal => "Formal",
            Tone::Friendly => "Friendly",
            Tone::Humorous => "Humorous",
            Tone::Professional => "Professional",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
pub enum PointOfView {
    #[default]
    #[serde(rename = "First person singular (I, me, my, mine)")]
    FirstPersonSingular,
    #[serde(rename = "First person plural (we, us, our, ours)")]
    FirstPersonPlural,
    #[serde(rename = "Second person (you, your, yours)")]
    SecondPerson,
    #[serde(rename = "Third person (he, she, it, they)")]
    ThirdPerson,
}

impl PointOfView {
    pub const ALL: [PointOfView; 4] = [
        PointOfView::FirstPersonSingular,
        PointOfView::FirstPersonPlural,
        PointOfView::SecondPerson,
        PointOfView::ThirdPerson,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PointOfView::FirstPersonSingular => "First person singular (I, me, my, mine)",
            PointOfView::FirstPersonPlural => "First person plural (we, us, our, ours)",
            PointOfView::SecondPerson => "Second person (you, your, yours)",
            PointOfView::ThirdPerson => "Third person (he, she, it, they)",
        }
    }
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// First page: what to write about and for whom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInputForm {
    #[serde(default)]
    pub target_keyword: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Treat `target_keyword` as a list, one article per entry.
    #[serde(default)]
    pub batch: bool,
}

impl Default for UserInputForm {
    fn default() -> Self {
        Self {
            target_keyword: String::new(),
            country: default_country(),
            language: default_language(),
            batch: false,
        }
    }
}

fn keyword_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[\r\n,;]+").expect("static regex"))
}

impl UserInputForm {
    /// Keywords to generate, in input order. Single mode always yields exactly
    /// one entry, even when it is empty.
    pub fn keywords(&self) -> Vec<String> {
        if !self.batch {
            return vec![self.target_keyword.trim().to_string()];
        }
        keyword_separator()
            .split(&self.target_keyword)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SectionFlags {
    #[serde(default)]
    pub faq: bool,
    #[serde(default)]
    pub youtube: bool,
    #[serde(default)]
    pub meta_description: bool,
    #[serde(default)]
    pub featured_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AdvancedOptions {
    pub extra_title_prompt: String,
    pub extra_intro_prompt: String,
    pub extra_content_prompt: String,
    /// Secondary keywords, free text.
    pub keywords: String,
    pub word_per_h2_section: Option<u32>,
    pub word_per_h3_section: Option<u32>,
    pub min_word_count: Option<u32>,
}

impl AdvancedOptions {
    /// The open panel always carries word targets, never below the form minimums.
    fn normalized(mut self) -> Self {
        self.word_per_h2_section = Some(self.word_per_h2_section.map_or(MIN_WORDS_PER_H2, |w| w.max(MIN_WORDS_PER_H2)));
        self.word_per_h3_section = Some(self.word_per_h3_section.map_or(MIN_WORDS_PER_H3, |w| w.max(MIN_WORDS_PER_H3)));
        self
    }
}

/// Second page: how the article should read and which extras to include.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ArticleConfiguration {
    #[serde(default)]
    pub tone_of_voice: Tone,
    #[serde(default)]
    pub point_of_view: PointOfView,
    #[serde(default)]
    pub sections: SectionFlags,
    /// Present only when the advanced panel was opened.
    #[serde(default)]
    pub advanced: Option<AdvancedOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardInput {
    UserInput(UserInputForm),
    Configure(ArticleConfiguration),
    Reset,
}

impl WizardInput {
    fn name(&self) -> &'static str {
        match self {
            WizardInput::UserInput(_) => "user input",
            WizardInput::Configure(_) => "configuration",
            WizardInput::Reset => "reset",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("cannot accept {input} on page '{page}'")]
    UnexpectedInput { page: WizardPage, input: &'static str },
    #[error("articles can only be generated on page 'Article Display', wizard is on '{page}'")]
    NotReady { page: WizardPage },
    #[error("there is nothing to download yet")]
    NothingToDownload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Wizard {
    page: WizardPage,
    form: Option<UserInputForm>,
    config: Option<ArticleConfiguration>,
}

impl Wizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> WizardPage {
        self.page
    }

    pub fn form(&self) -> Option<&UserInputForm> {
        self.form.as_ref()
    }

    pub fn config(&self) -> Option<&ArticleConfiguration> {
        self.config.as_ref()
    }

    pub fn advance(&mut self, input: WizardInput) -> Result<WizardPage, WizardError> {
        match (self.page, input) {
            (_, WizardInput::Reset) => {
                *self = Self::default();
            }
            (WizardPage::UserInputForm, WizardInput::UserInput(form)) => {
                self.form = Some(form);
                self.page = WizardPage::ArticleConfiguration;
            }
            (WizardPage::ArticleConfiguration, WizardInput::Configure(mut config)) => {
                config.advanced = config.advanced.map(AdvancedOptions::normalized);
                self.config = Some(config);
                self.page = WizardPage::ArticleDisplay;
            }
            (page, other) => {
                return Err(WizardError::UnexpectedInput { page, input: other.name() });
            }
        }
        Ok(self.page)
    }

    /// Inputs for generation; only available on the display page.
    pub fn ready(&self) -> Result<(&UserInputForm, &ArticleConfiguration), WizardError> {
        match (self.page, &self.form, &self.config) {
            (WizardPage::ArticleDisplay, Some(form), Some(config)) => Ok((form, config)),
            (page, _, _) => Err(WizardError::NotReady { page }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(keyword: &str) -> UserInputForm {
        UserInputForm { target_keyword: keyword.into(), ..Default::default() }
    }

    #[test]
    fn walks_forward_through_three_pages() {
        let mut wizard = Wizard::new();
        assert_eq!(wizard.current_state(), WizardPage::UserInputForm);
        assert_eq!(wizard.advance(WizardInput::UserInput(form("solar panels"))), Ok(WizardPage::ArticleConfiguration));
        assert_eq!(
            wizard.advance(WizardInput::Configure(ArticleConfiguration::default())),
            Ok(WizardPage::ArticleDisplay)
        );
        let (f, c) = wizard.ready().unwrap();
        assert_eq!(f.target_keyword, "solar panels");
        assert_eq!(f.country, "United States");
        assert_eq!(c.tone_of_voice, Tone::SeoOptimized);
    }

    #[test]
    fn rejects_out_of_order_input_without_moving() {
        let mut wizard = Wizard::new();
        let err = wizard.advance(WizardInput::Configure(ArticleConfiguration::default())).unwrap_err();
        assert_eq!(err, WizardError::UnexpectedInput { page: WizardPage::UserInputForm, input: "configuration" });
        assert_eq!(wizard.current_state(), WizardPage::UserInputForm);

        wizard.advance(WizardInput::UserInput(form("a"))).unwrap();
        // no going back to the first page by resubmitting it
        assert!(wizard.advance(WizardInput::UserInput(form("b"))).is_err());
        assert_eq!(wizard.form().unwrap().target_keyword, "a");
        assert_eq!(wizard.ready(), Err(WizardError::NotReady { page: WizardPage::ArticleConfiguration }));
    }

    #[test]
    fn reset_clears_inputs_from_any_page() {
        let mut wizard = Wizard::new();
        wizard.advance(WizardInput::UserInput(form("a"))).unwrap();
        wizard.advance(WizardInput::Configure(ArticleConfiguration::default())).unwrap();
        assert_eq!(wizard.advance(WizardInput::Reset), Ok(WizardPage::UserInputForm));
        assert!(wizard.form().is_none());
        assert!(wizard.config().is_none());
    }

    #[test]
    fn empty_keyword_is_accepted() {
        let mut wizard = Wizard::new();
        assert!(wizard.advance(WizardInput::UserInput(form(""))).is_ok());
        assert_eq!(wizard.form().unwrap().keywords(), vec![String::new()]);
    }

    #[test]
    fn batch_mode_splits_and_trims_keywords() {
        let f = UserInputForm { target_keyword: " solar panels \nwind turbines, heat pumps;;\n\n".into(), batch: true, ..Default::default() };
        assert_eq!(f.keywords(), vec!["solar panels", "wind turbines", "heat pumps"]);
        let single = UserInputForm { target_keyword: "a, b".into(), ..Default::default() };
        assert_eq!(single.keywords(), vec!["a, b"]);
    }

    #[test]
    fn word_targets_are_raised_to_form_minimums() {
        let mut wizard = Wizard::new();
        wizard.advance(WizardInput::UserInput(form("a"))).unwrap();
        let config = ArticleConfiguration {
            advanced: Some(AdvancedOptions {
                word_per_h2_section: Some(100),
                word_per_h3_section: Some(400),
                ..Default::default()
            }),
            ..Default::default()
        };
        wizard.advance(WizardInput::Configure(config)).unwrap();
        let advanced = wizard.config().unwrap().advanced.as_ref().unwrap();
        assert_eq!(advanced.word_per_h2_section, Some(MIN_WORDS_PER_H2));
        assert_eq!(advanced.word_per_h3_section, Some(400));
    }

    #[test]
    fn opened_panel_starts_with_default_word_targets() {
        let mut wizard = Wizard::new();
        wizard.advance(WizardInput::UserInput(form("a"))).unwrap();
        let config = ArticleConfiguration { advanced: Some(AdvancedOptions::default()), ..Default::default() };
        wizard.advance(WizardInput::Configure(config)).unwrap();
        let advanced = wizard.config().unwrap().advanced.as_ref().unwrap();
        assert_eq!(advanced.word_per_h2_section, Some(MIN_WORDS_PER_H2));
        assert_eq!(advanced.word_per_h3_section, Some(MIN_WORDS_PER_H3));

        let mut closed = Wizard::new();
        closed.advance(WizardInput::UserInput(form("a"))).unwrap();
        closed.advance(WizardInput::Configure(ArticleConfiguration::default())).unwrap();
        assert!(closed.config().unwrap().advanced.is_none());
    }

    #[test]
    fn labels_match_serialized_names() {
        let json = serde_json::to_string(&WizardPage::ArticleConfiguration).unwrap();
        assert_eq!(json, "\"Article Configuration\"");
        for tone in Tone::ALL {
            assert_eq!(serde_json::to_string(&tone).unwrap(), format!("\"{}\"", tone.label()));
        }
        for pov in PointOfView::ALL {
            assert_eq!(serde_json::to_string(&pov).unwrap(), format!("\"{}\"", pov.label()));
        }
    }
}
