use crate::article::Article;
use crate::settings::SessionSettings;
use crate::wizard::{Wizard, WizardPage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Everything one user run of the wizard accumulates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settings: SessionSettings,
    pub wizard: Wizard,
    pub articles: Vec<Article>,
    /// Zip written for a batch download, removed once the download is confirmed.
    #[serde(skip)]
    pub archive: Option<PathBuf>,
}

impl Session {
    pub fn new(client_id: Option<String>, settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            created_at: Utc::now(),
            settings,
            wizard: Wizard::new(),
            articles: Vec::new(),
            archive: None,
        }
    }

    pub fn page(&self) -> WizardPage {
        self.wizard.current_state()
    }

    /// Drops inputs, articles and the archive reference and returns to the
    /// first page. Settings overrides survive. The archive file itself is the
    /// caller's to delete.
    pub fn reset(&mut self) -> Option<PathBuf> {
        self.wizard = Wizard::new();
        self.articles.clear();
        self.archive.take()
    }
}
