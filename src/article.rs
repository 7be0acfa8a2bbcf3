use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::completion::CompletionClient;
use crate::models::CompletionError;
use crate::prompts::{self, ArticleBrief};
use crate::settings::GenerationMode;
use crate::wizard::SectionFlags;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Title,
    Intro,
    Body,
    Faq,
    Youtube,
    Meta,
    Image,
    Conclusion,
    /// Single-call output holding the whole article.
    Combined,
}

impl Section {
    /// Every section an article may have, in document order.
    pub const ORDER: [Section; 8] = [
        Section::Title,
        Section::Intro,
        Section::Body,
        Section::Faq,
        Section::Youtube,
        Section::Meta,
        Section::Image,
        Section::Conclusion,
    ];

    pub fn is_enabled(&self, flags: &SectionFlags) -> bool {
        match self {
            Section::Faq => flags.faq,
            Section::Youtube => flags.youtube,
            Section::Meta => flags.meta_description,
            Section::Image => flags.featured_image,
            Section::Combined => false,
            Section::Title | Section::Intro | Section::Body | Section::Conclusion => true,
        }
    }

    /// Sections generated for `flags`, in document order.
    pub fn sequence(flags: &SectionFlags) -> Vec<Section> {
        Self::ORDER.into_iter().filter(|s| s.is_enabled(flags)).collect()
    }

    /// Literal line placed above the section text in the rendered document.
    fn heading(&self) -> Option<&'static str> {
        match self {
            Section::Faq => Some("FAQ:"),
            Section::Youtube => Some("YouTube Suggestions:"),
            Section::Meta => Some("Meta Description:"),
            Section::Image => Some("Featured Image:"),
            Section::Conclusion => Some("Conclusion:"),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Title => "title",
            Section::Intro => "intro",
            Section::Body => "body",
            Section::Faq => "faq",
            Section::Youtube => "youtube",
            Section::Meta => "meta description",
            Section::Image => "featured image",
            Section::Conclusion => "conclusion",
            Section::Combined => "article",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleSection {
    pub section: Section,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub keyword: String,
    pub sections: Vec<ArticleSection>,
    pub created_at: DateTime<Utc>,
}

impl Article {
    #[cfg(test)]
    pub fn section(&self, section: Section) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.section == section)
            .map(|s| s.text.as_str())
    }

    pub fn section_order(&self) -> Vec<Section> {
        self.sections.iter().map(|s| s.section).collect()
    }

    /// Plain-text document: sections separated by a blank line.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|s| match s.section.heading() {
                Some(heading) => format!("{}\n{}", heading, s.text.trim()),
                None => s.text.trim().to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Error)]
#[error("generating {section} for '{keyword}': {source}")]
pub struct ArticleError {
    pub keyword: String,
    pub section: Section,
    #[source]
    pub source: CompletionError,
}

impl ArticleError {
    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}

/// Strip whitespace and wrapping quotes the model tends to put around titles.
fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string()
}

/// Runs the section chain for one keyword. Each call sees the earlier
/// exchanges through a conversation that lives only as long as this article.
/// `on_step` fires before every call with `(section, step, total_steps)`.
pub async fn generate_article(
    client: &CompletionClient,
    brief: &ArticleBrief,
    mode: GenerationMode,
    on_step: &mut (dyn FnMut(Section, usize, usize) + Send),
) -> Result<Article, ArticleError> {
    let plan = match mode {
        GenerationMode::Sectioned => Section::sequence(&brief.sections),
        GenerationMode::Combined => vec![Section::Combined],
    };
    let total = plan.len();
    let mut conversation = client.conversation();
    let mut sections = Vec::with_capacity(total);
    let mut title = String::new();

    for (i, section) in plan.into_iter().enumerate() {
        on_step(section, i + 1, total);
        let prompt = match section {
            Section::Title => prompts::title_prompt(brief),
            Section::Intro => prompts::intro_prompt(brief, &title),
            Section::Body => prompts::body_prompt(brief, &title),
            Section::Faq => prompts::faq_prompt(brief, &title),
            Section::Youtube => prompts::youtube_prompt(brief),
            Section::Meta => prompts::meta_prompt(brief, &title),
            Section::Image => prompts::image_prompt(brief, &title),
            Section::Conclusion => prompts::conclusion_prompt(brief, &title),
            Section::Combined => prompts::combined_prompt(brief),
        };
        debug!(keyword = %brief.keyword, %section, step = i + 1, total, "requesting section");
        let text = client
            .complete(&mut conversation, &prompt)
            .await
            .map_err(|source| ArticleError { keyword: brief.keyword.clone(), section, source })?;
        let text = if section == Section::Title { clean_title(&text) } else { text };
        if section == Section::Title {
            title = text.clone();
        }
        sections.push(ArticleSection { section, text });
    }

    conversation.clear();
    metrics::counter!("articles_generated_total").increment(1);
    info!(keyword = %brief.keyword, sections = sections.len(), "article assembled");
    Ok(Article { keyword: brief.keyword.clone(), sections, created_at: Utc::now() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::{ScriptedModel, settings};
    use crate::completion::RetryPolicy;
    use crate::wizard::{ArticleConfiguration, Tone, UserInputForm};
    use std::sync::Arc;

    fn brief(keyword: &str, sections: SectionFlags) -> ArticleBrief {
        let form = UserInputForm { target_keyword: keyword.into(), ..Default::default() };
        let config = ArticleConfiguration { tone_of_voice: Tone::Casual, sections, ..Default::default() };
        ArticleBrief::new(keyword, &form, &config, &[])
    }

    fn all_flag_subsets() -> Vec<SectionFlags> {
        (0..16u8)
            .map(|bits| SectionFlags {
                faq: bits & 1 != 0,
                youtube: bits & 2 != 0,
                meta_description: bits & 4 != 0,
                featured_image: bits & 8 != 0,
            })
            .collect()
    }

    #[test]
    fn no_flags_means_four_core_sections() {
        assert_eq!(
            Section::sequence(&SectionFlags::default()),
            vec![Section::Title, Section::Intro, Section::Body, Section::Conclusion]
        );
    }

    #[test]
    fn optional_sections_sit_between_body_and_conclusion_once_each() {
        for flags in all_flag_subsets() {
            let seq = Section::sequence(&flags);
            assert_eq!(&seq[..3], &[Section::Title, Section::Intro, Section::Body]);
            assert_eq!(seq.last(), Some(&Section::Conclusion));
            let middle = &seq[3..seq.len() - 1];
            let expected: Vec<Section> = [Section::Faq, Section::Youtube, Section::Meta, Section::Image]
                .into_iter()
                .filter(|s| s.is_enabled(&flags))
                .collect();
            assert_eq!(middle, expected.as_slice());
            let mut sorted = seq.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted, seq);
        }
    }

    #[tokio::test]
    async fn title_feeds_later_prompts_and_history_stays_bounded() {
        let model = Arc::new(ScriptedModel::with_replies(vec![Ok("\"Sunny Savings\"".into())]));
        let client = CompletionClient::new(model.clone(), &settings(14, RetryPolicy::no_retry()));
        let flags = SectionFlags { faq: true, youtube: true, meta_description: true, featured_image: true };
        let mut steps = Vec::new();
        let article = generate_article(&client, &brief("solar panels", flags), GenerationMode::Sectioned, &mut |s, i, n| steps.push((s, i, n)))
            .await
            .unwrap();

        assert_eq!(article.section_order(), Section::ORDER.to_vec());
        assert_eq!(article.section(Section::Title), Some("Sunny Savings"));
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0], (Section::Title, 1, 8));
        assert_eq!(steps[7], (Section::Conclusion, 8, 8));

        let prompts = model.prompts();
        assert!(prompts[0].contains("SEO-optimized"));
        assert!(prompts[1].contains("\"Sunny Savings\""));
        for req in model.requests.lock().unwrap().iter() {
            assert!(req.messages.len() - 1 <= 14);
        }
    }

    #[tokio::test]
    async fn combined_mode_makes_one_call() {
        let model = Arc::new(ScriptedModel::with_replies(vec![Ok("whole article".into())]));
        let client = CompletionClient::new(model.clone(), &settings(14, RetryPolicy::no_retry()));
        let article = generate_article(&client, &brief("tea", SectionFlags::default()), GenerationMode::Combined, &mut |_, _, _| {})
            .await
            .unwrap();
        assert_eq!(article.section_order(), vec![Section::Combined]);
        assert_eq!(article.render(), "whole article");
        assert!(model.prompts()[0].starts_with("Write an article about tea."));
    }

    #[tokio::test]
    async fn failed_section_abandons_the_article() {
        let model = Arc::new(ScriptedModel::with_replies(vec![
            Ok("Title".into()),
            Ok("Intro".into()),
            Err(CompletionError::Permanent("boom".into())),
        ]));
        let client = CompletionClient::new(model, &settings(14, RetryPolicy::no_retry()));
        let err = generate_article(&client, &brief("tea", SectionFlags::default()), GenerationMode::Sectioned, &mut |_, _, _| {})
            .await
            .unwrap_err();
        assert_eq!(err.section, Section::Body);
        assert_eq!(err.keyword, "tea");
        assert!(!err.is_transient());
    }

    #[test]
    fn render_uses_fixed_separators() {
        let article = Article {
            keyword: "tea".into(),
            sections: vec![
                ArticleSection { section: Section::Title, text: "Tea".into() },
                ArticleSection { section: Section::Intro, text: "Intro.\n".into() },
                ArticleSection { section: Section::Body, text: "Body.".into() },
                ArticleSection { section: Section::Meta, text: "Meta.".into() },
                ArticleSection { section: Section::Conclusion, text: "End.".into() },
            ],
            created_at: Utc::now(),
        };
        assert_eq!(
            article.render(),
            "Tea\n\nIntro.\n\nBody.\n\nMeta Description:\nMeta.\n\nConclusion:\nEnd."
        );
    }
}
