// src/config/mod.rs - Rule configuration store with hot-reload support

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{sleep, Duration};

use crate::bot::messages::MessageTemplates;
use crate::bot::pattern_matching::CompiledCategory;
use crate::types::{CategoryDocument, ConfigLoadError, RuleCompileError};

pub mod settings;

pub use settings::{ChatRouting, ChatThreads, EngineSettings};

pub const BANNED_TOPICS_FILE: &str = "banned_topics.yaml";
pub const AUTO_REMOVE_FILE: &str = "auto_remove.yaml";
pub const NEWBIE_TOPICS_FILE: &str = "newbie_topics.yaml";
pub const TEMPLATES_FILE: &str = "templates.yaml";

const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Events broadcast when the published configuration changes
#[derive(Debug, Clone)]
pub enum ConfigChangeEvent {
    ReloadComplete { generation: u64, skipped_rules: usize },
    ValidationError { error: String },
}

/// One immutable, fully compiled configuration snapshot
#[derive(Debug)]
pub struct ModerationConfiguration {
    pub banned_topics: Vec<CompiledCategory>,
    pub auto_remove_topics: Vec<CompiledCategory>,
    pub newbie_faq_topics: Vec<CompiledCategory>,
    pub link_block_domains: Vec<String>,
    pub link_ignore_domains: Vec<String>,
    pub templates: MessageTemplates,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    /// Rules dropped during compilation
    pub skipped_rules: Vec<RuleCompileError>,
}

#[derive(Debug, Deserialize)]
struct CategoriesDocument {
    #[serde(default)]
    categories: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
struct AutoRemoveDocument {
    #[serde(default)]
    categories: serde_yaml::Mapping,
    #[serde(default)]
    link_block_domains: Vec<String>,
    #[serde(default)]
    link_ignore_domains: Vec<String>,
}

/// Schema checks applied before anything is compiled
pub struct ConfigValidator;

impl ConfigValidator {
    /// Parse a `categories:` mapping in declaration order
    fn categories(
        document: &str,
        mapping: &serde_yaml::Mapping,
    ) -> Result<Vec<(String, CategoryDocument)>, ConfigLoadError> {
        let mut categories = Vec::with_capacity(mapping.len());

        for (key, value) in mapping {
            let name = key
                .as_str()
                .ok_or_else(|| ConfigLoadError::schema(document, "category names must be strings"))?
                .trim()
                .to_string();
            if name.is_empty() {
                return Err(ConfigLoadError::schema(document, "category name cannot be empty"));
            }

            let category: CategoryDocument = serde_yaml::from_value(value.clone())
                .map_err(|e| ConfigLoadError::schema(document, format!("category '{}': {}", name, e)))?;

            Self::validate_category(document, &name, &category)?;
            categories.push((name, category));
        }

        Ok(categories)
    }

    fn validate_category(document: &str, name: &str, category: &CategoryDocument) -> Result<(), ConfigLoadError> {
        if category.header.trim().is_empty() {
            return Err(ConfigLoadError::schema(
                document,
                format!("category '{}' has an empty header", name),
            ));
        }

        if category.terms.is_empty() && category.patterns.is_empty() {
            return Err(ConfigLoadError::schema(
                document,
                format!("category '{}' has no terms or patterns", name),
            ));
        }

        if category.terms.iter().any(|t| t.term().trim().is_empty()) {
            return Err(ConfigLoadError::schema(
                document,
                format!("category '{}' contains an empty term", name),
            ));
        }

        if category.patterns.iter().any(|p| p.pattern().is_empty()) {
            return Err(ConfigLoadError::schema(
                document,
                format!("category '{}' contains an empty pattern", name),
            ));
        }

        Ok(())
    }

    fn domains(document: &str, field: &str, raw: Vec<String>) -> Result<Vec<String>, ConfigLoadError> {
        raw.into_iter()
            .map(|domain| {
                let domain = domain.trim().to_lowercase();
                if domain.is_empty() {
                    Err(ConfigLoadError::schema(document, format!("{} contains an empty entry", field)))
                } else {
                    Ok(domain)
                }
            })
            .collect()
    }
}

fn parse_yaml<T: for<'de> Deserialize<'de>>(document: &str, content: &str) -> Result<T, ConfigLoadError> {
    serde_yaml::from_str(content).map_err(|e| ConfigLoadError::schema(document, e.to_string()))
}

fn compile_all(
    categories: Vec<(String, CategoryDocument)>,
    skipped: &mut Vec<RuleCompileError>,
) -> Vec<CompiledCategory> {
    categories
        .iter()
        .map(|(name, document)| {
            let (compiled, errors) = CompiledCategory::compile(name, document);
            skipped.extend(errors);
            compiled
        })
        .collect()
}

impl ModerationConfiguration {
    /// Configuration with no rules, used before the first load
    pub fn empty() -> Self {
        Self {
            banned_topics: Vec::new(),
            auto_remove_topics: Vec::new(),
            newbie_faq_topics: Vec::new(),
            link_block_domains: Vec::new(),
            link_ignore_domains: Vec::new(),
            templates: MessageTemplates::default(),
            generation: 0,
            loaded_at: Utc::now(),
            skipped_rules: Vec::new(),
        }
    }

    /// Validate and compile the rule documents from their YAML text
    pub fn from_documents(
        banned_topics: &str,
        auto_remove: &str,
        newbie_topics: &str,
        templates: Option<&str>,
    ) -> Result<Self, ConfigLoadError> {
        let banned: CategoriesDocument = parse_yaml(BANNED_TOPICS_FILE, banned_topics)?;
        let removal: AutoRemoveDocument = parse_yaml(AUTO_REMOVE_FILE, auto_remove)?;
        let newbie: CategoriesDocument = parse_yaml(NEWBIE_TOPICS_FILE, newbie_topics)?;

        let banned = ConfigValidator::categories(BANNED_TOPICS_FILE, &banned.categories)?;
        let auto_remove = ConfigValidator::categories(AUTO_REMOVE_FILE, &removal.categories)?;
        let newbie = ConfigValidator::categories(NEWBIE_TOPICS_FILE, &newbie.categories)?;
        let link_block_domains =
            ConfigValidator::domains(AUTO_REMOVE_FILE, "link_block_domains", removal.link_block_domains)?;
        let link_ignore_domains =
            ConfigValidator::domains(AUTO_REMOVE_FILE, "link_ignore_domains", removal.link_ignore_domains)?;

        let templates = match templates {
            Some(content) if !content.trim().is_empty() => parse_yaml(TEMPLATES_FILE, content)?,
            _ => MessageTemplates::default(),
        };

        let mut skipped_rules = Vec::new();
        let configuration = Self {
            banned_topics: compile_all(banned, &mut skipped_rules),
            auto_remove_topics: compile_all(auto_remove, &mut skipped_rules),
            newbie_faq_topics: compile_all(newbie, &mut skipped_rules),
            link_block_domains,
            link_ignore_domains,
            templates,
            generation: 0,
            loaded_at: Utc::now(),
            skipped_rules,
        };

        debug!(
            "Compiled {} banned, {} auto-remove, {} newbie categories",
            configuration.banned_topics.len(),
            configuration.auto_remove_topics.len(),
            configuration.newbie_faq_topics.len()
        );
        Ok(configuration)
    }
}

/// Owns the published snapshot and reloads it from the configuration directory
#[derive(Clone)]
pub struct ConfigurationManager {
    config_dir: PathBuf,

    /// Current snapshot; readers clone the inner `Arc` and release the lock
    snapshot: Arc<RwLock<Arc<ModerationConfiguration>>>,

    /// Held from load to publish so generations follow load order
    reload_lock: Arc<Mutex<()>>,

    /// File watchers for hot-reloading
    watchers: Arc<RwLock<Vec<RecommendedWatcher>>>,

    change_notifier: broadcast::Sender<ConfigChangeEvent>,
}

impl ConfigurationManager {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        let (tx, _) = broadcast::channel(100);

        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            snapshot: Arc::new(RwLock::new(Arc::new(ModerationConfiguration::empty()))),
            reload_lock: Arc::new(Mutex::new(())),
            watchers: Arc::new(RwLock::new(Vec::new())),
            change_notifier: tx,
        }
    }

    /// Create the configuration directory with starter documents if needed,
    /// then publish the first snapshot.
    pub async fn initialize(&self) -> Result<Arc<ModerationConfiguration>> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir).await.with_context(|| {
                format!("Failed to create configuration directory {}", self.config_dir.display())
            })?;
            info!("Created configuration directory: {}", self.config_dir.display());
            self.write_starter_documents().await?;
        }

        let snapshot = self
            .reload()
            .await
            .context("Initial configuration load failed")?;

        info!("Configuration manager initialized successfully");
        Ok(snapshot)
    }

    async fn write_starter_documents(&self) -> Result<()> {
        for (file, content) in [
            (BANNED_TOPICS_FILE, STARTER_BANNED_TOPICS),
            (AUTO_REMOVE_FILE, STARTER_AUTO_REMOVE),
            (NEWBIE_TOPICS_FILE, STARTER_NEWBIE_TOPICS),
        ] {
            let path = self.config_dir.join(file);
            fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Created starter configuration: {}", path.display());
        }
        Ok(())
    }

    async fn read_document(&self, file: &str, required: bool) -> Result<Option<String>, ConfigLoadError> {
        let path = self.config_dir.join(file);
        if !path.exists() {
            return if required {
                Err(ConfigLoadError::Missing { path })
            } else {
                Ok(None)
            };
        }

        fs::read_to_string(&path)
            .await
            .map(Some)
            .map_err(|source| ConfigLoadError::Io { path, source })
    }

    /// Read and compile the documents without publishing them
    pub async fn load(&self) -> Result<ModerationConfiguration, ConfigLoadError> {
        let banned = self.read_document(BANNED_TOPICS_FILE, true).await?.unwrap_or_default();
        let auto_remove = self.read_document(AUTO_REMOVE_FILE, true).await?.unwrap_or_default();
        let newbie = self.read_document(NEWBIE_TOPICS_FILE, true).await?.unwrap_or_default();
        let templates = self.read_document(TEMPLATES_FILE, false).await?;

        ModerationConfiguration::from_documents(&banned, &auto_remove, &newbie, templates.as_deref())
    }

    /// Load and publish. On failure the previous snapshot stays active.
    pub async fn reload(&self) -> Result<Arc<ModerationConfiguration>, ConfigLoadError> {
        let _serialized = self.reload_lock.lock().await;
        let mut configuration = match self.load().await {
            Ok(configuration) => configuration,
            Err(e) => {
                error!("Configuration reload rejected, keeping previous snapshot: {}", e);
                let _ = self.change_notifier.send(ConfigChangeEvent::ValidationError {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let published = {
            let mut current = self.snapshot.write().await;
            configuration.generation = current.generation + 1;
            let published = Arc::new(configuration);
            *current = Arc::clone(&published);
            published
        };

        if !published.skipped_rules.is_empty() {
            warn!(
                "Configuration generation {} skipped {} uncompilable rule(s)",
                published.generation,
                published.skipped_rules.len()
            );
        }
        info!("Published configuration generation {}", published.generation);

        let _ = self.change_notifier.send(ConfigChangeEvent::ReloadComplete {
            generation: published.generation,
            skipped_rules: published.skipped_rules.len(),
        });

        Ok(published)
    }

    /// The snapshot in effect right now
    pub async fn snapshot(&self) -> Arc<ModerationConfiguration> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_notifier.subscribe()
    }

    /// Watch the configuration directory and reload when a rule document changes
    pub async fn watch(&self) -> Result<()> {
        let (tx, mut rx) = tokio::sync::mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if let Err(e) = tx.blocking_send(event) {
                        error!("Failed to send file watch event: {}", e);
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            }
        })?;

        watcher.watch(&self.config_dir, RecursiveMode::NonRecursive)?;

        // Dropping the watcher stops it
        self.watchers.write().await.push(watcher);

        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !is_relevant(&event) {
                    continue;
                }

                // Editors often emit several events per save
                sleep(WATCH_DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                info!("Rule documents changed, reloading...");
                if let Err(e) = manager.reload().await {
                    error!("Failed to reload configuration: {}", e);
                }
            }
            debug!("Configuration watcher stopped");
        });

        info!("Watching {} for configuration changes", self.config_dir.display());
        Ok(())
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event.paths.iter().any(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| {
                    matches!(
                        name,
                        BANNED_TOPICS_FILE | AUTO_REMOVE_FILE | NEWBIE_TOPICS_FILE | TEMPLATES_FILE
                    )
                })
        })
}

const STARTER_BANNED_TOPICS: &str = r#"# Banned topics: warned for everyone, moderators included.
categories:
  unsafe_substances:
    header: "⚠️ This substance is not discussed in this community for safety reasons."
    terms:
      - term: DNP
        detail: "This is a highly dangerous mitochondrial decoupler."
      - term: BAM15
        detail: "This is a dangerous mitochondrial decoupler."
  diy_botox:
    header: "⚠️ DIY Botox is strongly discouraged."
    terms:
      - term: Botox
        detail: "No known community lab can verify the potency of botulinum toxin."
"#;

const STARTER_AUTO_REMOVE: &str = r#"# Auto-removal: the message is deleted and a notice is posted.
categories:
  group_test_invites:
    header: "💨🚫 Group test invites are not posted here."
    threads: [group_test]
    terms:
      - t.me/
link_block_domains:
  - t.me/+
  - chat.whatsapp.com
link_ignore_domains:
  - docs.google.com
"#;

const STARTER_NEWBIE_TOPICS: &str = r#"# Newbie FAQ: auto-replies in the newbies thread.
categories:
  amo_labels:
    header: "❓ Looking for info on a vendor label?"
    patterns:
      - pattern: '\sL\d{2}.*\?'
        detail: "Check the vendor spreadsheet pinned in Rules & Guides first."
      - pattern: 'L\s\d{2}.*\?'
        detail: "Check the vendor spreadsheet pinned in Rules & Guides first."
      - pattern: 'Amo.*L.*\?'
        detail: "Check the vendor spreadsheet pinned in Rules & Guides first."
  qsc:
    header: "❓ Asking about QSC?"
    terms:
      - term: QSC
        detail: "Search the Newbies thread; this one comes up a lot."
"#;
