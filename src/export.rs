use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::article::{self, Article, ArticleError, Section};
use crate::completion::CompletionClient;
use crate::prompts::ArticleBrief;
use crate::session::Session;
use crate::settings::EffectiveSettings;
use crate::wizard::WizardError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchProgress {
    pub keyword: String,
    /// 1-based position of the keyword in the batch.
    pub keyword_index: usize,
    pub keyword_total: usize,
    pub section: Section,
    pub step: usize,
    pub total_steps: usize,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Article(#[from] ArticleError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error("writing archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("building archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// One brief per keyword, from the inputs of a wizard on its display page.
pub fn briefs_for_session(session: &Session, settings: &EffectiveSettings) -> Result<Vec<ArticleBrief>, WizardError> {
    let (form, config) = session.wizard.ready()?;
    Ok(form
        .keywords()
        .iter()
        .map(|keyword| ArticleBrief::new(keyword, form, config, &settings.exclusion_phrases))
        .collect())
}

/// Generates articles one keyword after the other, appending each finished
/// article to `out`. Stops at the first failed article; earlier ones stay.
pub async fn generate_batch(
    client: &CompletionClient,
    briefs: &[ArticleBrief],
    settings: &EffectiveSettings,
    on_progress: &mut (dyn FnMut(&BatchProgress) + Send),
    out: &mut Vec<Article>,
) -> Result<(), ArticleError> {
    let keyword_total = briefs.len();
    for (i, brief) in briefs.iter().enumerate() {
        let mut on_step = |section: Section, step: usize, total_steps: usize| {
            on_progress(&BatchProgress {
                keyword: brief.keyword.clone(),
                keyword_index: i + 1,
                keyword_total,
                section,
                step,
                total_steps,
            });
        };
        let article = article::generate_article(client, brief, settings.mode, &mut on_step).await?;
        out.push(article);
    }
    Ok(())
}

/// Runs generation for a session on its display page, replacing any
/// articles from an earlier run.
pub async fn generate_for_session(
    session: &mut Session,
    client: &CompletionClient,
    settings: &EffectiveSettings,
    on_progress: &mut (dyn FnMut(&BatchProgress) + Send),
) -> Result<usize, GenerationError> {
    let briefs = briefs_for_session(session, settings)?;
    if let Some(stale) = session.archive.take() {
        remove_archive(&stale);
    }
    session.articles.clear();
    info!(session = %session.id, keywords = briefs.len(), mode = ?settings.mode, "generating articles");
    generate_batch(client, &briefs, settings, on_progress, &mut session.articles).await?;
    Ok(session.articles.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Download {
    Text { filename: String, body: String },
    Archive { filename: String, path: PathBuf },
}

/// The keyword as typed, with characters that cannot appear in a file name replaced.
fn file_stem(keyword: &str) -> String {
    let stem: String = keyword
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() { "article".to_string() } else { stem.to_string() }
}

/// Archive entry name for the article at 1-based `index`.
pub fn entry_name(keyword: &str, index: usize) -> String {
    format!("{}_{}.txt", file_stem(keyword), index)
}

/// Writes `articles` to a zip at `path`. A failed write leaves no file behind.
pub fn write_archive(path: &Path, articles: &[Article]) -> Result<(), ExportError> {
    write_or_remove(path, |file| fill_archive(ZipWriter::new(file), articles))
}

fn write_or_remove(path: &Path, fill: impl FnOnce(fs::File) -> Result<(), ExportError>) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let result = fill(fs::File::create(path)?);
    if result.is_err() {
        remove_archive(path);
    }
    result
}

fn fill_archive(mut zip: ZipWriter<fs::File>, articles: &[Article]) -> Result<(), ExportError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (i, article) in articles.iter().enumerate() {
        zip.start_file(entry_name(&article.keyword, i + 1), options)?;
        zip.write_all(article.render().as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

/// A single article downloads as text; several go into a zip under
/// `archive_dir`, remembered on the session until the download is confirmed.
pub fn prepare_download(session: &mut Session, archive_dir: &Path) -> Result<Download, ExportError> {
    match session.articles.as_slice() {
        [] => Err(WizardError::NothingToDownload.into()),
        [article] => Ok(Download::Text {
            filename: format!("{}.txt", file_stem(&article.keyword)),
            body: article.render(),
        }),
        articles => {
            let filename = format!("articles_{}.zip", session.id.simple());
            let path = match session.archive.clone() {
                Some(existing) if existing.exists() => existing,
                _ => {
                    let path = archive_dir.join(&filename);
                    write_archive(&path, articles)?;
                    info!(path = %path.display(), entries = articles.len(), "archive written");
                    session.archive = Some(path.clone());
                    path
                }
            };
            Ok(Download::Archive { filename, path })
        }
    }
}

fn remove_archive(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "archive removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove archive"),
    }
}

/// The user has the download: drop the archive and start the wizard over.
pub fn confirm_download(session: &mut Session) -> Result<(), ExportError> {
    if session.articles.is_empty() {
        return Err(WizardError::NothingToDownload.into());
    }
    reset_session(session);
    Ok(())
}

pub fn reset_session(session: &mut Session) {
    if let Some(path) = session.reset() {
        remove_archive(&path);
    }
}
