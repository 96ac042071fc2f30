//! Markdown mailboxes and strategic documents

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use eyre::{Context, Result};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::PhaseKind;

/// Shared strategic documents under the project root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedDoc {
    MasterPlan,
    Architecture,
    PrimaryObjectives,
    SecondaryObjectives,
    TertiaryObjectives,
    ArchitectureStatus,
    ArchitectureChanges,
    ArchitectureAlerts,
}

impl SharedDoc {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::MasterPlan => "MASTER_PLAN.md",
            Self::Architecture => "ARCHITECTURE.md",
            Self::PrimaryObjectives => "PRIMARY_OBJECTIVES.md",
            Self::SecondaryObjectives => "SECONDARY_OBJECTIVES.md",
            Self::TertiaryObjectives => "TERTIARY_OBJECTIVES.md",
            Self::ArchitectureStatus => "ARCHITECTURE_STATUS.md",
            Self::ArchitectureChanges => "ARCHITECTURE_CHANGES.md",
            Self::ArchitectureAlerts => "ARCHITECTURE_ALERTS.md",
        }
    }

    fn template(&self) -> String {
        let title = self.file_name().trim_end_matches(".md").replace('_', " ");
        format!("# {}\n\n", title)
    }

    /// Which phase may write this document. Strategic docs belong to
    /// planning, the objective tiers to project planning; documentation
    /// owns the architecture status and alert docs; the change log
    /// belongs to planning.
    fn writer(&self) -> PhaseKind {
        match self {
            Self::ArchitectureStatus | Self::ArchitectureAlerts => PhaseKind::Documentation,
            Self::PrimaryObjectives | Self::SecondaryObjectives | Self::TertiaryObjectives => {
                PhaseKind::ProjectPlanning
            }
            _ => PhaseKind::Planning,
        }
    }
}

/// All shared docs, for template creation
const ALL_SHARED: [SharedDoc; 8] = [
    SharedDoc::MasterPlan,
    SharedDoc::Architecture,
    SharedDoc::PrimaryObjectives,
    SharedDoc::SecondaryObjectives,
    SharedDoc::TertiaryObjectives,
    SharedDoc::ArchitectureStatus,
    SharedDoc::ArchitectureChanges,
    SharedDoc::ArchitectureAlerts,
];

/// Hub over every IPC document, serializing writers per file
pub struct DocumentHub {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DocumentHub {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root: project_root.as_ref().to_path_buf(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn inbox_path(&self, phase: PhaseKind) -> PathBuf {
        self.root.join(format!("{}_READ.md", phase.document_stem()))
    }

    fn status_path(&self, phase: PhaseKind) -> PathBuf {
        self.root.join(format!("{}_WRITE.md", phase.document_stem()))
    }

    fn shared_path(&self, doc: SharedDoc) -> PathBuf {
        self.root.join(doc.file_name())
    }

    async fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Read any document, returning its template when missing
    async fn read(&self, path: &Path, template: &str) -> Result<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(template.to_string()),
            Err(e) => Err(e).context(format!("Failed to read {}", path.display())),
        }
    }

    async fn write(&self, path: &Path, content: &str) -> Result<()> {
        let lock = self.file_lock(path).await;
        let _guard = lock.lock().await;
        tokio::fs::write(path, content)
            .await
            .context(format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "Wrote IPC document");
        Ok(())
    }

    async fn append(&self, path: &Path, template: &str, entry: &str) -> Result<()> {
        let lock = self.file_lock(path).await;
        let _guard = lock.lock().await;

        let mut content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => template.to_string(),
            Err(e) => return Err(e).context(format!("Failed to read {}", path.display())),
        };
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(entry);
        content.push('\n');

        tokio::fs::write(path, content)
            .await
            .context(format!("Failed to append to {}", path.display()))
    }

    /// Read a shared strategic document
    pub async fn read_shared(&self, doc: SharedDoc) -> Result<String> {
        self.read(&self.shared_path(doc), &doc.template()).await
    }

    /// Replace one `## heading` section of a shared doc, appending the
    /// section when the heading is absent or malformed.
    pub async fn replace_shared_section(&self, doc: SharedDoc, heading: &str, body: &str) -> Result<()> {
        let path = self.shared_path(doc);
        let lock = self.file_lock(&path).await;
        let _guard = lock.lock().await;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => doc.template(),
            Err(e) => return Err(e).context(format!("Failed to read {}", path.display())),
        };

        let updated = replace_section(&content, heading, body);
        tokio::fs::write(&path, updated)
            .await
            .context(format!("Failed to write {}", path.display()))
    }

    /// Create every missing document from its template
    pub async fn ensure_documents(&self, phases: &[PhaseKind]) -> Result<()> {
        for doc in ALL_SHARED {
            let path = self.shared_path(doc);
            if !path.exists() {
                self.write(&path, &doc.template()).await?;
            }
        }
        for phase in phases {
            let stem = phase.document_stem();
            let inbox = self.inbox_path(*phase);
            if !inbox.exists() {
                self.write(&inbox, &format!("# {} inbox\n\n", stem)).await?;
            }
            let status = self.status_path(*phase);
            if !status.exists() {
                self.write(&status, &format!("# {} status\n\n", stem)).await?;
            }
        }
        Ok(())
    }
}

/// A phase's view of the document hub
///
/// Enforces the ownership contract: a phase writes only its own `_WRITE`
/// document, may append to any other phase's `_READ` inbox, and may write
/// a shared document only when it owns it.
pub struct PhaseDocuments {
    hub: Arc<DocumentHub>,
    phase: PhaseKind,
}

impl PhaseDocuments {
    /// Scoped handle enforcing a phase's document permissions
    pub fn new(hub: Arc<DocumentHub>, phase: PhaseKind) -> Self {
        Self { hub, phase }
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    /// Read this phase's inbox
    pub async fn read_inbox(&self) -> Result<String> {
        let path = self.hub.inbox_path(self.phase);
        let template = format!("# {} inbox\n\n", self.phase.document_stem());
        self.hub.read(&path, &template).await
    }

    /// Read the inbox and reset it to its template (consume the mailbox)
    pub async fn take_inbox(&self) -> Result<String> {
        let path = self.hub.inbox_path(self.phase);
        let template = format!("# {} inbox\n\n", self.phase.document_stem());
        let content = self.hub.read(&path, &template).await?;
        self.hub.write(&path, &template).await?;
        Ok(content)
    }

    /// Replace this phase's status document
    pub async fn write_status(&self, content: &str) -> Result<()> {
        let path = self.hub.status_path(self.phase);
        let header = format!("# {} status\n\n", self.phase.document_stem());
        self.hub.write(&path, &format!("{}{}\n", header, content.trim_end())).await
    }

    /// Append a dated entry to another phase's inbox
    pub async fn send_to(&self, recipient: PhaseKind, entry: &str) -> Result<()> {
        let path = self.hub.inbox_path(recipient);
        let template = format!("# {} inbox\n\n", recipient.document_stem());
        let stamped = format!(
            "## From {} at {}\n\n{}",
            self.phase,
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            entry.trim_end()
        );
        self.hub.append(&path, &template, &stamped).await
    }

    /// Read any shared strategic document
    pub async fn read_shared(&self, doc: SharedDoc) -> Result<String> {
        self.hub.read_shared(doc).await
    }

    /// Replace a section of a shared document this phase owns
    pub async fn write_shared_section(&self, doc: SharedDoc, heading: &str, body: &str) -> Result<()> {
        if doc.writer() != self.phase {
            eyre::bail!("phase {} may not write {}", self.phase, doc.file_name());
        }
        self.hub.replace_shared_section(doc, heading, body).await
    }

    /// Append a dated line to a log-style shared document this phase owns
    pub async fn append_shared_log(&self, doc: SharedDoc, line: &str) -> Result<()> {
        if doc.writer() != self.phase {
            eyre::bail!("phase {} may not write {}", self.phase, doc.file_name());
        }
        let path = self.hub.shared_path(doc);
        let stamped = format!("- {} {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), line.trim_end());
        self.hub.append(&path, &doc.template(), &stamped).await
    }
}

/// Replace the body under `## heading`, or append the section when the
/// heading does not exist. Malformed or duplicate headings are tolerated:
/// the first match wins.
fn replace_section(content: &str, heading: &str, body: &str) -> String {
    let marker = format!("## {}", heading);
    let lines: Vec<&str> = content.lines().collect();

    let start = lines.iter().position(|line| line.trim() == marker);
    match start {
        Some(start) => {
            let end = lines[start + 1..]
                .iter()
                .position(|line| line.starts_with("## "))
                .map(|offset| start + 1 + offset)
                .unwrap_or(lines.len());

            let mut out: Vec<String> = lines[..=start].iter().map(|s| s.to_string()).collect();
            out.push(String::new());
            out.push(body.trim_end().to_string());
            out.push(String::new());
            out.extend(lines[end..].iter().map(|s| s.to_string()));
            out.join("\n")
        }
        None => {
            let mut out = content.trim_end().to_string();
            out.push_str(&format!("\n\n{}\n\n{}\n", marker, body.trim_end()));
            out
        }
    }
}
