//! In-memory [`Store`] implementation for tests and embedding.
//!
//! All tables live in one [`State`] behind a single `std::sync::RwLock`, so
//! a version, its content, its chunks and its postings are installed under
//! one write guard and readers never see a half-written version.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{LedgerError, Result};
use crate::models::{Chunk, Document, IndexedFolder, Project, RetentionPolicy};

use super::{
    postings_for, under_folder, AppendOutcome, Candidate, NewVersion, ProjectReferences,
    PurgeStats, Store, VersionInfo,
};

#[derive(Default)]
struct State {
    docs: HashMap<String, Document>,
    /// path → document ids ordered by ascending version.
    by_path: HashMap<String, Vec<String>>,
    contents: HashMap<String, String>,
    chunks: HashMap<String, Vec<Chunk>>,
    /// term → document ids.
    index: HashMap<String, BTreeSet<String>>,
    /// document id → indexed terms, for removal.
    doc_terms: HashMap<String, BTreeSet<String>>,
    policy: RetentionPolicy,
    projects: BTreeMap<String, Project>,
    folders: BTreeMap<String, IndexedFolder>,
}

impl State {
    fn latest(&self, path: &str) -> Option<&Document> {
        self.by_path
            .get(path)
            .and_then(|ids| ids.last())
            .and_then(|id| self.docs.get(id))
    }

    fn remove_version(&mut self, id: &str) -> Option<(Document, u64)> {
        let doc = self.docs.remove(id)?;
        let bytes = self
            .contents
            .remove(id)
            .map(|c| c.len() as u64)
            .unwrap_or(0);
        self.chunks.remove(id);
        if let Some(terms) = self.doc_terms.remove(id) {
            for term in terms {
                if let Some(ids) = self.index.get_mut(&term) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.index.remove(&term);
                    }
                }
            }
        }
        if let Some(ids) = self.by_path.get_mut(&doc.path) {
            ids.retain(|other| other != id);
            if ids.is_empty() {
                self.by_path.remove(&doc.path);
            }
        }
        Some((doc, bytes))
    }

    fn remove_path(&mut self, path: &str) -> usize {
        let ids = self.by_path.get(path).cloned().unwrap_or_default();
        ids.iter()
            .filter(|id| self.remove_version(id).is_some())
            .count()
    }

    fn latest_paths_under(&self, folder: &str, project_id: Option<&str>) -> Vec<String> {
        let mut paths: Vec<String> = self
            .by_path
            .keys()
            .filter(|p| under_folder(p, folder))
            .filter(|p| match project_id {
                Some(pid) => self
                    .latest(p)
                    .map(|d| d.project_id.as_deref() == Some(pid))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

/// In-memory store for tests and single-process embedding.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| LedgerError::internal("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| LedgerError::internal("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn latest_version(&self, path: &str) -> Result<Option<Document>> {
        Ok(self.read()?.latest(path).cloned())
    }

    async fn append_version(&self, new: NewVersion) -> Result<AppendOutcome> {
        let mut state = self.write()?;
        let current = state.latest(&new.document.path).map(|d| d.version);
        if current != new.expected_latest {
            return Ok(AppendOutcome::Conflict { current });
        }

        let NewVersion {
            document,
            chunks,
            content,
            ..
        } = new;
        let id = document.id.clone();
        let path = document.path.clone();

        let previous = state.by_path.get(&path).and_then(|ids| ids.last()).cloned();
        if let Some(prev) = previous.and_then(|prev_id| state.docs.get_mut(&prev_id)) {
            prev.is_latest = false;
        }

        let mut terms = BTreeSet::new();
        for posting in postings_for(&document, &chunks) {
            terms.insert(posting.term);
        }
        for term in &terms {
            state
                .index
                .entry(term.clone())
                .or_default()
                .insert(id.clone());
        }
        state.doc_terms.insert(id.clone(), terms);
        state.contents.insert(id.clone(), content);
        state.chunks.insert(id.clone(), chunks);
        state.by_path.entry(path).or_default().push(id.clone());
        state.docs.insert(id, document);
        Ok(AppendOutcome::Appended)
    }

    async fn list_versions(&self, path: &str) -> Result<Vec<Document>> {
        let state = self.read()?;
        let ids = state.by_path.get(path).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| state.docs.get(id).cloned())
            .collect())
    }

    async fn get_version(&self, path: &str, version: u32) -> Result<Option<Document>> {
        let state = self.read()?;
        Ok(state.by_path.get(path).and_then(|ids| {
            ids.iter()
                .filter_map(|id| state.docs.get(id))
                .find(|d| d.version == version)
                .cloned()
        }))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(id).cloned())
    }

    async fn get_content(&self, document_id: &str) -> Result<Option<String>> {
        Ok(self.read()?.contents.get(document_id).cloned())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .read()?
            .chunks
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_path(&self, path: &str) -> Result<usize> {
        Ok(self.write()?.remove_path(path))
    }

    async fn paths_under(&self, folder: &str, project_id: Option<&str>) -> Result<Vec<String>> {
        Ok(self.read()?.latest_paths_under(folder, project_id))
    }

    async fn all_versions(&self) -> Result<Vec<VersionInfo>> {
        let state = self.read()?;
        let mut out: Vec<VersionInfo> = state
            .docs
            .values()
            .map(|d| VersionInfo {
                document_id: d.id.clone(),
                path: d.path.clone(),
                version: d.version,
                is_latest: d.is_latest,
                indexed_at: d.indexed_at,
                content_bytes: state
                    .contents
                    .get(&d.id)
                    .map(|c| c.len() as u64)
                    .unwrap_or(0),
            })
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path).then(a.version.cmp(&b.version)));
        Ok(out)
    }

    async fn delete_versions(&self, document_ids: &[String]) -> Result<PurgeStats> {
        let mut state = self.write()?;
        let mut stats = PurgeStats::default();
        for id in document_ids {
            let deletable = state.docs.get(id).map(|d| !d.is_latest).unwrap_or(false);
            if !deletable {
                continue;
            }
            if let Some((_, bytes)) = state.remove_version(id) {
                stats.versions_deleted += 1;
                stats.space_freed_bytes += bytes;
            }
        }
        Ok(stats)
    }

    async fn search_candidates(
        &self,
        terms: &[String],
        include_historical: bool,
    ) -> Result<Vec<Candidate>> {
        let state = self.read()?;
        let mut ids: BTreeSet<&String> = BTreeSet::new();
        for term in terms {
            if let Some(hits) = state.index.get(term) {
                ids.extend(hits.iter());
            }
        }
        Ok(ids
            .into_iter()
            .filter_map(|id| state.docs.get(id))
            .filter(|d| include_historical || d.is_latest)
            .map(|d| Candidate {
                document: d.clone(),
                chunks: state.chunks.get(&d.id).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn list_latest(
        &self,
        project_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Document>, usize)> {
        let state = self.read()?;
        let mut docs: Vec<&Document> = state
            .docs
            .values()
            .filter(|d| d.is_latest)
            .filter(|d| project_id.is_none() || d.project_id.as_deref() == project_id)
            .collect();
        docs.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        let total = docs.len();
        let page = docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn retention_policy(&self) -> Result<RetentionPolicy> {
        Ok(self.read()?.policy.clone())
    }

    async fn set_retention_policy(&self, policy: &RetentionPolicy) -> Result<()> {
        self.write()?.policy = policy.clone();
        Ok(())
    }

    async fn create_project(&self, project: &Project) -> Result<()> {
        let mut state = self.write()?;
        if state.projects.contains_key(&project.id) {
            return Err(LedgerError::invalid(format!(
                "project '{}' already exists",
                project.id
            )));
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.read()?.projects.get(id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.read()?.projects.values().cloned().collect())
    }

    async fn delete_project(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.projects.remove(id).is_some())
    }

    async fn project_references(&self, id: &str) -> Result<ProjectReferences> {
        let state = self.read()?;
        let documents = state
            .docs
            .values()
            .filter(|d| d.project_id.as_deref() == Some(id))
            .map(|d| d.path.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let folders = state
            .folders
            .values()
            .filter(|f| f.project_id.as_deref() == Some(id))
            .count();
        Ok(ProjectReferences { documents, folders })
    }

    async fn upsert_folder(&self, folder: &IndexedFolder) -> Result<()> {
        self.write()?
            .folders
            .insert(folder.path.clone(), folder.clone());
        Ok(())
    }

    async fn get_folder(&self, path: &str) -> Result<Option<IndexedFolder>> {
        Ok(self.read()?.folders.get(path).cloned())
    }

    async fn list_folders(&self) -> Result<Vec<IndexedFolder>> {
        Ok(self.read()?.folders.values().cloned().collect())
    }

    async fn assign_folder(&self, path: &str, project_id: Option<&str>) -> Result<usize> {
        let mut state = self.write()?;
        match state.folders.get_mut(path) {
            Some(folder) => folder.project_id = project_id.map(str::to_string),
            None => return Err(LedgerError::not_found(format!("folder {path}"), "index it first")),
        }
        let mut restamped = 0;
        for doc in state.docs.values_mut() {
            if under_folder(&doc.path, path) {
                doc.project_id = project_id.map(str::to_string);
                restamped += 1;
            }
        }
        Ok(restamped)
    }

    async fn remove_folder(&self, path: &str) -> Result<usize> {
        let mut state = self.write()?;
        let folder = state.folders.remove(path).ok_or_else(|| {
            LedgerError::not_found(format!("folder {path}"), "list folders to see registered roots")
        })?;
        let doomed = match folder.project_id.as_deref() {
            Some(pid) => state.latest_paths_under(path, Some(pid)),
            None => state
                .latest_paths_under(path, None)
                .into_iter()
                .filter(|p| state.latest(p).map(|d| d.project_id.is_none()).unwrap_or(false))
                .collect(),
        };
        for p in &doomed {
            state.remove_path(p);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, version: u32) -> Document {
        Document {
            id: format!("{path}@{version}"),
            path: path.to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            extension: "md".to_string(),
            size: 10,
            modified_at: 100 + version as i64,
            title: Some("Kubernetes Notes".to_string()),
            tags: vec![],
            headings: vec![],
            content_excerpt: String::new(),
            content_hash: format!("hash{version}"),
            indexed_at: 1000 + version as i64,
            version,
            is_latest: true,
            project_id: None,
        }
    }

    fn version(path: &str, v: u32, expected: Option<u32>, text: &str) -> NewVersion {
        let document = doc(path, v);
        let chunk = Chunk {
            id: format!("{}:0", document.id),
            document_id: document.id.clone(),
            chunk_index: 0,
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            hash: String::new(),
        };
        NewVersion {
            expected_latest: expected,
            document,
            chunks: vec![chunk],
            content: text.to_string(),
        }
    }

    #[tokio::test]
    async fn append_flips_latest_flag() {
        let store = InMemoryStore::new();
        store.append_version(version("a.md", 1, None, "one")).await.unwrap();
        store.append_version(version("a.md", 2, Some(1), "two")).await.unwrap();

        let versions = store.list_versions("a.md").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 2);
        assert!(versions[0].is_latest);
        assert!(!versions[1].is_latest);
    }

    #[tokio::test]
    async fn stale_expectation_conflicts_without_writing() {
        let store = InMemoryStore::new();
        store.append_version(version("a.md", 1, None, "one")).await.unwrap();
        let outcome = store
            .append_version(version("a.md", 1, None, "dup"))
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Conflict { current: Some(1) });
        assert_eq!(store.list_versions("a.md").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn candidates_exclude_history_by_default() {
        let store = InMemoryStore::new();
        store.append_version(version("a.md", 1, None, "docker one")).await.unwrap();
        store.append_version(version("a.md", 2, Some(1), "docker two")).await.unwrap();

        let terms = vec!["docker".to_string()];
        let latest = store.search_candidates(&terms, false).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].document.version, 2);

        let all = store.search_candidates(&terms, true).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn title_tokens_are_indexed() {
        let store = InMemoryStore::new();
        store.append_version(version("a.md", 1, None, "body")).await.unwrap();
        let hits = store
            .search_candidates(&["kubernetes".to_string()], false)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn delete_versions_skips_latest() {
        let store = InMemoryStore::new();
        store.append_version(version("a.md", 1, None, "12345")).await.unwrap();
        store.append_version(version("a.md", 2, Some(1), "abc")).await.unwrap();

        let ids = vec!["a.md@1".to_string(), "a.md@2".to_string()];
        let stats = store.delete_versions(&ids).await.unwrap();
        assert_eq!(stats.versions_deleted, 1);
        assert_eq!(stats.space_freed_bytes, 5);
        assert!(store.get_chunks("a.md@1").await.unwrap().is_empty());
        assert!(store
            .search_candidates(&["12345".to_string()], true)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.list_versions("a.md").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_path_removes_everything() {
        let store = InMemoryStore::new();
        store.append_version(version("a.md", 1, None, "x")).await.unwrap();
        store.append_version(version("a.md", 2, Some(1), "y")).await.unwrap();
        assert_eq!(store.delete_path("a.md").await.unwrap(), 2);
        assert!(store.latest_version("a.md").await.unwrap().is_none());
        assert!(store.get_content("a.md@2").await.unwrap().is_none());
    }
}
