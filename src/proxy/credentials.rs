// Credential Pool - per-request upstream credentials with health tracking
//
// The handlers and the streaming translator only see the `CredentialGateway`
// trait. `CredentialPool` is the file-backed implementation:
// - one JSON file per credential, id = file stem
// - health score per credential (DashMap<String, f32>)
// - healthiest credential wins, ties rotate round-robin

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Placeholder project id sent when a credential has none
pub const MISSING_PROJECT_ID: &str = "None";

/// One upstream credential, as handed to a single request
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub id: String,
    pub access_token: String,
    pub project_id: Option<String>,
    pub email: Option<String>,
}

impl Credential {
    pub fn project_id_or_placeholder(&self) -> &str {
        self.project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(MISSING_PROJECT_ID)
    }
}

/// Supplies credentials and receives call outcomes for failover.
#[async_trait]
pub trait CredentialGateway: Send + Sync {
    /// `None` means no credential is available for this request.
    async fn acquire(&self) -> Option<Credential>;

    fn record_outcome(&self, credential_id: &str, success: bool);
}

/// Reports the outcome of one call back to the gateway.
#[derive(Clone)]
pub struct OutcomeReporter {
    gateway: Arc<dyn CredentialGateway>,
    credential_id: String,
}

impl OutcomeReporter {
    pub fn new(gateway: Arc<dyn CredentialGateway>, credential_id: String) -> Self {
        Self {
            gateway,
            credential_id,
        }
    }

    pub fn report(&self, success: bool) {
        self.gateway.record_outcome(&self.credential_id, success);
    }
}

/// On-disk credential file
#[derive(Debug, Deserialize)]
struct CredentialFile {
    access_token: Option<String>,
    #[serde(default)]
    token: Option<NestedToken>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct NestedToken {
    access_token: Option<String>,
}

const INITIAL_HEALTH: f32 = 1.0;
const SUCCESS_BONUS: f32 = 0.1;
const FAILURE_PENALTY: f32 = 0.2;

/// File-backed credential pool
pub struct CredentialPool {
    dir: PathBuf,
    credentials: DashMap<String, Credential>,
    /// Load order, used for stable round-robin among equal scores
    order: RwLock<Vec<String>>,
    health_scores: DashMap<String, f32>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            credentials: DashMap::new(),
            order: RwLock::new(Vec::new()),
            health_scores: DashMap::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Build a pool from an explicit list (no disk access).
    pub fn from_credentials(credentials: Vec<Credential>) -> Self {
        let pool = Self::new(PathBuf::new());
        {
            let mut order = pool.order.write();
            for credential in credentials {
                order.push(credential.id.clone());
                pool.credentials.insert(credential.id.clone(), credential);
            }
        }
        pool
    }

    /// Load all credentials from the pool directory.
    ///
    /// Clears the existing pool first. Disabled, unreadable and token-less
    /// files are skipped. Returns the number of loaded credentials.
    pub async fn load(&self) -> Result<usize, String> {
        if !self.dir.exists() {
            return Err(format!("Credentials directory does not exist: {:?}", self.dir));
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| format!("Failed to read credentials directory: {}", e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("Failed to read directory entry: {}", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        self.credentials.clear();
        let mut order = Vec::with_capacity(paths.len());

        for path in paths {
            match Self::load_single(&path).await {
                Ok(Some(credential)) => {
                    order.push(credential.id.clone());
                    self.credentials.insert(credential.id.clone(), credential);
                }
                Ok(None) => {
                    tracing::debug!("Credential skipped (disabled): {:?}", path);
                }
                Err(e) => {
                    tracing::warn!("Failed to load credential {:?}: {}", path, e);
                }
            }
        }

        self.health_scores
            .retain(|id, _| self.credentials.contains_key(id));
        let count = order.len();
        *self.order.write() = order;

        tracing::info!("Loaded {} credential(s) from {:?}", count, self.dir);
        Ok(count)
    }

    async fn load_single(path: &Path) -> Result<Option<Credential>, String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read file: {}", e))?;
        let file: CredentialFile =
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse JSON: {}", e))?;

        if file.disabled {
            return Ok(None);
        }

        let access_token = file
            .access_token
            .or_else(|| file.token.and_then(|t| t.access_token))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "Missing access_token".to_string())?;

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| "Invalid file name".to_string())?
            .to_string();

        Ok(Some(Credential {
            id,
            access_token,
            project_id: file.project_id.filter(|p| !p.is_empty()),
            email: file.email,
        }))
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn health_score(&self, credential_id: &str) -> f32 {
        self.health_scores
            .get(credential_id)
            .map(|v| *v)
            .unwrap_or(INITIAL_HEALTH)
    }

    /// Pick the healthiest credential, rotating among equal scores.
    fn select(&self) -> Option<Credential> {
        let order = self.order.read();
        if order.is_empty() {
            return None;
        }

        let best = order
            .iter()
            .map(|id| self.health_score(id))
            .fold(f32::MIN, f32::max);

        let tied: Vec<&String> = order
            .iter()
            .filter(|id| (self.health_score(id) - best).abs() < f32::EPSILON)
            .collect();

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let id = tied.get(start % tied.len().max(1))?;
        self.credentials.get(id.as_str()).map(|c| c.clone())
    }
}

#[async_trait]
impl CredentialGateway for CredentialPool {
    async fn acquire(&self) -> Option<Credential> {
        let credential = self.select();
        match &credential {
            Some(c) => tracing::debug!(
                "Using credential {} (health={:.2})",
                c.id,
                self.health_score(&c.id)
            ),
            None => tracing::warn!("No credentials available"),
        }
        credential
    }

    fn record_outcome(&self, credential_id: &str, success: bool) {
        let current = self.health_score(credential_id);
        let new_score = if success {
            (current + SUCCESS_BONUS).min(1.0)
        } else {
            (current - FAILURE_PENALTY).max(0.0)
        };
        self.health_scores
            .insert(credential_id.to_string(), new_score);

        if !success {
            tracing::warn!(
                "Credential {} failed, health {:.2} -> {:.2}",
                credential_id,
                current,
                new_score
            );
        }
    }
}
