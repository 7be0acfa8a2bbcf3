use serde::Serialize;

use crate::wizard::{AdvancedOptions, ArticleConfiguration, PointOfView, SectionFlags, Tone, UserInputForm};

/// Wizard inputs frozen for one keyword.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArticleBrief {
    pub keyword: String,
    pub country: String,
    pub language: String,
    pub tone: Tone,
    pub point_of_view: PointOfView,
    pub sections: SectionFlags,
    pub advanced: AdvancedOptions,
    pub exclusion_phrases: Vec<String>,
}

impl ArticleBrief {
    pub fn new(
        keyword: &str,
        form: &UserInputForm,
        config: &ArticleConfiguration,
        exclusion_phrases: &[String],
    ) -> Self {
        Self {
            keyword: keyword.to_string(),
            country: form.country.clone(),
            language: form.language.clone(),
            tone: config.tone_of_voice,
            point_of_view: config.point_of_view,
            sections: config.sections,
            advanced: config.advanced.clone().unwrap_or_default(),
            exclusion_phrases: exclusion_phrases.to_vec(),
        }
    }
}

fn push_extra(prompt: &mut String, extra: &str) {
    let extra = extra.trim();
    if !extra.is_empty() {
        prompt.push(' ');
        prompt.push_str(extra);
    }
}

fn push_voice(prompt: &mut String, brief: &ArticleBrief) {
    prompt.push_str(&format!(
        " Write in {} with a {} tone, from a {} point of view.",
        brief.language,
        brief.tone.label(),
        brief.point_of_view.label()
    ));
}

fn push_exclusions(prompt: &mut String, brief: &ArticleBrief) {
    if brief.exclusion_phrases.is_empty() {
        return;
    }
    let quoted: Vec<String> = brief.exclusion_phrases.iter().map(|p| format!("\"{}\"", p)).collect();
    prompt.push_str(&format!(" Do not use any of these phrases: {}.", quoted.join(", ")));
}

/// Whole article in one request.
pub fn combined_prompt(brief: &ArticleBrief) -> String {
    let mut prompt = format!("Write an article about {}.", brief.keyword);

    if !brief.country.is_empty() {
        prompt.push_str(&format!(" The article should be relevant to {}.", brief.country));
    }
    prompt.push_str(&format!(" The tone of the article should be {}.", brief.tone.label()));
    prompt.push_str(&format!(" Write from a {}.", brief.point_of_view.label()));

    if brief.sections.faq {
        prompt.push_str(" Include an FAQ section.");
    }
    if brief.sections.youtube {
        prompt.push_str(" Suggest relevant YouTube videos. It should be urls to the videos");
    }
    if brief.sections.meta_description {
        prompt.push_str(" Create a meta description for the article.");
    }
    if brief.sections.featured_image {
        prompt.push_str(" Suggest a featured image. It should be urls to the image");
    }

    let advanced = &brief.advanced;
    push_extra(&mut prompt, &advanced.extra_title_prompt);
    push_extra(&mut prompt, &advanced.extra_intro_prompt);
    push_extra(&mut prompt, &advanced.extra_content_prompt);
    if !advanced.keywords.trim().is_empty() {
        prompt.push_str(&format!(" Include keywords: {}.", advanced.keywords.trim()));
    }
    if let Some(words) = advanced.word_per_h2_section {
        prompt.push_str(&format!(" Approximately {} words per H2 section.", words));
    }
    if let Some(words) = advanced.word_per_h3_section {
        prompt.push_str(&format!(" Approximately {} words per H3 section.", words));
    }
    prompt
}

pub fn title_prompt(brief: &ArticleBrief) -> String {
    let mut prompt = format!("Write an SEO-optimized title for an article about {}.", brief.keyword);
    prompt.push_str(&format!(
        " The article targets readers in {} and is written in {}.",
        brief.country, brief.language
    ));
    prompt.push_str(&format!(" The tone should be {}.", brief.tone.label()));
    push_extra(&mut prompt, &brief.advanced.extra_title_prompt);
    prompt.push_str(" Reply with the title only, without quotation marks.");
    prompt
}

pub fn intro_prompt(brief: &ArticleBrief, title: &str) -> String {
    let mut prompt = format!(
        "Write an engaging introduction for the article titled \"{}\" about {}.",
        title, brief.keyword
    );
    push_voice(&mut prompt, brief);
    push_extra(&mut prompt, &brief.advanced.extra_intro_prompt);
    push_exclusions(&mut prompt, brief);
    prompt
}

pub fn body_prompt(brief: &ArticleBrief, title: &str) -> String {
    let keyword = &brief.keyword;
    let mut prompt = format!(
        "Write the main body of the article titled \"{}\". The body must cover {} in depth.",
        title, keyword
    );
    prompt.push_str(&format!(
        " Organize it into H2 and H3 sections that explore the most important aspects of {} for readers in {}.",
        keyword, brief.country
    ));
    prompt.push_str(&format!(
        " Use the phrase \"{}\" naturally throughout the text and support it with practical examples.",
        keyword
    ));
    push_voice(&mut prompt, brief);

    let advanced = &brief.advanced;
    if !advanced.keywords.trim().is_empty() {
        prompt.push_str(&format!(" Include the following keywords: {}.", advanced.keywords.trim()));
    }
    if let Some(words) = advanced.word_per_h2_section {
        prompt.push_str(&format!(" Each H2 section should have approximately {} words.", words));
    }
    if let Some(words) = advanced.word_per_h3_section {
        prompt.push_str(&format!(" Each H3 section should have approximately {} words.", words));
    }
    if let Some(words) = advanced.min_word_count {
        prompt.push_str(&format!(" The body must be at least {} words long.", words));
    }
    push_extra(&mut prompt, &advanced.extra_content_prompt);
    push_exclusions(&mut prompt, brief);
    prompt
}

pub fn faq_prompt(brief: &ArticleBrief, title: &str) -> String {
    let mut prompt = format!(
        "Write an FAQ section for the article titled \"{}\" with five common questions about {} and a concise answer to each.",
        title, brief.keyword
    );
    push_voice(&mut prompt, brief);
    prompt
}

pub fn youtube_prompt(brief: &ArticleBrief) -> String {
    format!(
        "Suggest relevant YouTube videos about {} for readers in {}. List them as urls to the videos.",
        brief.keyword, brief.country
    )
}

pub fn meta_prompt(brief: &ArticleBrief, title: &str) -> String {
    format!(
        "Write a meta description of no more than 160 characters for the article titled \"{}\" about {}. Reply with the meta description only.",
        title, brief.keyword
    )
}

pub fn image_prompt(brief: &ArticleBrief, title: &str) -> String {
    format!(
        "Suggest a featured image for the article titled \"{}\" about {}. Provide a url to the image and a short alt text.",
        title, brief.keyword
    )
}

pub fn conclusion_prompt(brief: &ArticleBrief, title: &str) -> String {
    let mut prompt = format!(
        "Write a conclusion for the article titled \"{}\" that sums up the key points about {}.",
        title, brief.keyword
    );
    push_voice(&mut prompt, brief);
    push_exclusions(&mut prompt, brief);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief(keyword: &str) -> ArticleBrief {
        let form = UserInputForm { target_keyword: keyword.into(), ..Default::default() };
        let config = ArticleConfiguration { tone_of_voice: Tone::Casual, ..Default::default() };
        ArticleBrief::new(keyword, &form, &config, &[])
    }

    #[test]
    fn title_prompt_names_keyword_and_seo() {
        let b = brief("solar panels");
        let prompt = title_prompt(&b);
        assert!(prompt.contains("solar panels"));
        assert!(prompt.contains("SEO-optimized"));
        assert!(prompt.contains("United States"));
        assert!(prompt.contains("Casual"));
    }

    #[test]
    fn body_prompt_repeats_keyword_in_each_fixed_clause() {
        let b = brief("solar panels");
        let prompt = body_prompt(&b, "Going Solar");
        assert!(prompt.matches("solar panels").count() >= 3);
        assert!(prompt.contains("\"Going Solar\""));
        assert!(!prompt.contains("Do not use"));
    }

    #[test]
    fn combined_prompt_matches_single_call_wording() {
        let mut b = brief("tea");
        b.sections = SectionFlags { faq: true, youtube: false, meta_description: true, featured_image: false };
        b.advanced = AdvancedOptions {
            keywords: "green tea".into(),
            word_per_h2_section: Some(300),
            ..Default::default()
        };
        assert_eq!(
            combined_prompt(&b),
            "Write an article about tea. The article should be relevant to United States. \
             The tone of the article should be Casual. \
             Write from a First person singular (I, me, my, mine). \
             Include an FAQ section. Create a meta description for the article. \
             Include keywords: green tea. Approximately 300 words per H2 section."
        );
    }

    #[test]
    fn combined_prompt_from_opened_panel_carries_word_targets() {
        use crate::wizard::{Wizard, WizardInput};
        let mut wizard = Wizard::new();
        wizard
            .advance(WizardInput::UserInput(UserInputForm { target_keyword: "tea".into(), ..Default::default() }))
            .unwrap();
        wizard
            .advance(WizardInput::Configure(ArticleConfiguration {
                advanced: Some(AdvancedOptions::default()),
                ..Default::default()
            }))
            .unwrap();
        let (form, config) = wizard.ready().unwrap();
        let prompt = combined_prompt(&ArticleBrief::new("tea", form, config, &[]));
        assert!(prompt.ends_with("Approximately 300 words per H2 section. Approximately 150 words per H3 section."));
    }

    #[test]
    fn optional_clauses_follow_inputs() {
        let mut b = brief("kayaks");
        b.exclusion_phrases = vec!["Moreover".into(), "In conclusion".into()];
        b.advanced = AdvancedOptions {
            extra_intro_prompt: "Mention river safety.".into(),
            min_word_count: Some(1500),
            word_per_h3_section: Some(150),
            ..Default::default()
        };
        let intro = intro_prompt(&b, "T");
        assert!(intro.ends_with("Do not use any of these phrases: \"Moreover\", \"In conclusion\"."));
        assert!(intro.contains("Mention river safety."));

        let body = body_prompt(&b, "T");
        assert!(body.contains("at least 1500 words"));
        assert!(body.contains("approximately 150 words"));
        assert!(!body.contains("H2 section should"));

        let conclusion = conclusion_prompt(&b, "T");
        assert!(conclusion.contains("\"Moreover\""));
        assert!(!faq_prompt(&b, "T").contains("Moreover"));
    }

    #[test]
    fn empty_keyword_is_interpolated_as_is() {
        let prompt = title_prompt(&brief(""));
        assert!(prompt.starts_with("Write an SEO-optimized title for an article about ."));
    }
}
