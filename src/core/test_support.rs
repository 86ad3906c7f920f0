// In-memory fakes of the core ports, shared by the service and router tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::documents::{
    DocumentError, DocumentReader, ParsedOralTarea, ParsedWritingTarea, TareaStore,
};
use crate::core::migration::{
    gcs_uri, is_migrated, AudioRowStore, AudioSource, AudioTable, MigrationError, MigrationStats,
    ObjectDownload, ObjectStore, PendingRow, RequiredColumn, SchemaReport, StoredObject,
};

// ============================================================================
// AUDIO ROWS
// ============================================================================

#[derive(Debug, Clone)]
struct AudioRow {
    audio_url: Option<String>,
    bucket_url: Option<String>,
}

/// One table's worth of rows, shared by every registry entry.
#[derive(Clone, Default)]
pub struct InMemoryAudioRows {
    rows: Arc<Mutex<BTreeMap<i64, AudioRow>>>,
    failure: Arc<Mutex<Option<String>>>,
    ensure_calls: Arc<AtomicUsize>,
    stale_pending: Arc<AtomicBool>,
}

impl InMemoryAudioRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: i64, audio_url: Option<&str>, bucket_url: Option<&str>) {
        self.rows.lock().unwrap().insert(
            id,
            AudioRow {
                audio_url: audio_url.map(str::to_string),
                bucket_url: bucket_url.map(str::to_string),
            },
        );
    }

    pub fn bucket_url(&self, id: i64) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|row| row.bucket_url.clone())
    }

    /// Every store call fails with `message` from now on.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// How many times the storage column was ensured.
    pub fn ensure_column_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// `pending_rows` also returns rows that are already migrated, as if
    /// another worker finished them after the query ran.
    pub fn serve_stale_pending(&self) {
        self.stale_pending.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), MigrationError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(MigrationError::StorageError(message.clone())),
            None => Ok(()),
        }
    }
}

fn has_audio(row: &AudioRow) -> bool {
    row.audio_url.as_deref().map_or(false, |url| !url.is_empty())
}

#[async_trait]
impl AudioRowStore for InMemoryAudioRows {
    async fn ensure_bucket_column(&self, _table: &AudioTable) -> Result<(), MigrationError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    async fn stats(&self, _table: &AudioTable) -> Result<MigrationStats, MigrationError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let count = |f: &dyn Fn(&AudioRow) -> bool| rows.values().filter(|r| f(r)).count() as i64;

        Ok(MigrationStats {
            total_rows: rows.len() as i64,
            rows_with_audio_url: count(&has_audio),
            rows_with_bucket_url: count(&|r: &AudioRow| is_migrated(r.bucket_url.as_deref())),
            pending_migration: count(&|r: &AudioRow| has_audio(r) && !is_migrated(r.bucket_url.as_deref())),
        })
    }

    async fn pending_rows(
        &self,
        _table: &AudioTable,
        limit: Option<i64>,
    ) -> Result<Vec<PendingRow>, MigrationError> {
        self.check()?;
        let stale = self.stale_pending.load(Ordering::SeqCst);
        let rows = self.rows.lock().unwrap();
        let pending = rows
            .iter()
            .filter(|(_, r)| has_audio(r) && (stale || !is_migrated(r.bucket_url.as_deref())))
            .map(|(id, r)| PendingRow {
                row_id: *id,
                audio_url: r.audio_url.clone().unwrap_or_default(),
                bucket_url: r.bucket_url.clone(),
            });

        Ok(match limit {
            Some(limit) => pending.take(limit.max(0) as usize).collect(),
            None => pending.collect(),
        })
    }

    async fn set_bucket_url(
        &self,
        _table: &AudioTable,
        row_id: i64,
        bucket_url: &str,
    ) -> Result<(), MigrationError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&row_id)
            .ok_or_else(|| MigrationError::StorageError(format!("no row {}", row_id)))?;
        row.bucket_url = Some(bucket_url.to_string());
        Ok(())
    }

    async fn inspect(&self, table: &AudioTable) -> Result<SchemaReport, MigrationError> {
        self.check()?;
        let stats = self.stats(table).await?;
        let required_columns = [table.id_column, table.audio_column]
            .iter()
            .map(|name| RequiredColumn {
                name: name.to_string(),
                present: true,
            })
            .collect();

        Ok(SchemaReport {
            table: table.table,
            table_exists: true,
            columns: Vec::new(),
            required_columns,
            bucket_column_exists: true,
            stats: Some(stats),
            samples: Vec::new(),
        })
    }
}

// ============================================================================
// AUDIO SOURCE
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeAudioSource {
    files: Arc<HashMap<String, Vec<u8>>>,
    downloads: Arc<Mutex<Vec<String>>>,
}

impl FakeAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, file_id: &str, data: &[u8]) -> Self {
        let mut files = (*self.files).clone();
        files.insert(file_id.to_string(), data.to_vec());
        Self {
            files: Arc::new(files),
            downloads: self.downloads,
        }
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSource for FakeAudioSource {
    async fn download(&self, file_id: &str) -> Result<Bytes, MigrationError> {
        self.downloads.lock().unwrap().push(file_id.to_string());
        self.files
            .get(file_id)
            .map(|data| Bytes::from(data.clone()))
            .ok_or_else(|| MigrationError::Download("HTTP 404".to_string()))
    }
}

// ============================================================================
// OBJECT STORE
// ============================================================================

#[derive(Clone)]
pub struct FakeObjectStore {
    bucket: String,
    objects: Arc<Mutex<BTreeMap<String, (Vec<u8>, String)>>>,
}

impl FakeObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, MigrationError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(gcs_uri(&self.bucket, key))
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>, MigrationError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
            .map(|(key, (data, content_type))| StoredObject {
                name: key.clone(),
                size: data.len() as u64,
                content_type: Some(content_type.clone()),
                updated: None,
            })
            .collect())
    }

    async fn open(&self, key: &str) -> Result<ObjectDownload, MigrationError> {
        let (data, content_type) = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| MigrationError::ObjectNotFound(key.to_string()))?;

        Ok(ObjectDownload {
            content_type: Some(content_type),
            content_length: Some(data.len() as u64),
            body: Box::pin(stream::once(async move { Ok(Bytes::from(data)) })),
        })
    }
}

// ============================================================================
// DOCUMENTS
// ============================================================================

/// Serves canned lines by file name. Unknown files fail to read.
#[derive(Clone, Default)]
pub struct FakeDocumentReader {
    documents: Arc<HashMap<String, Vec<String>>>,
}

impl FakeDocumentReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, file: &str, lines: &[&str]) -> Self {
        let mut documents = (*self.documents).clone();
        documents.insert(file.to_string(), lines.iter().map(|l| l.to_string()).collect());
        Self {
            documents: Arc::new(documents),
        }
    }
}

#[async_trait]
impl DocumentReader for FakeDocumentReader {
    async fn read_lines(&self, path: &Path) -> Result<Vec<String>, DocumentError> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.documents
            .get(&file)
            .cloned()
            .ok_or_else(|| DocumentError::Read {
                file,
                reason: "not a zip archive".to_string(),
            })
    }
}

#[derive(Default)]
struct TareaTables {
    next_id: i64,
    writing: Vec<ParsedWritingTarea>,
    oral: Vec<(ParsedOralTarea, i32, String)>,
    recreated: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryTareaStore {
    tables: Arc<Mutex<TareaTables>>,
}

impl InMemoryTareaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writing_rows(&self) -> Vec<ParsedWritingTarea> {
        self.tables.lock().unwrap().writing.clone()
    }

    pub fn oral_rows(&self) -> Vec<(ParsedOralTarea, i32, String)> {
        self.tables.lock().unwrap().oral.clone()
    }

    pub fn recreate_count(&self) -> usize {
        self.tables.lock().unwrap().recreated
    }

    pub fn seed_writing_row(&self) {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        tables.writing.push(ParsedWritingTarea::default());
    }
}

#[async_trait]
impl TareaStore for InMemoryTareaStore {
    async fn insert_writing_tarea1(
        &self,
        tarea: &ParsedWritingTarea,
        _module_type_id: i32,
    ) -> Result<i64, DocumentError> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        tables.writing.push(tarea.clone());
        Ok(tables.next_id)
    }

    async fn insert_oral_tarea2(
        &self,
        tarea: &ParsedOralTarea,
        module_type_id: i32,
        instructions: &str,
    ) -> Result<i64, DocumentError> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        tables
            .oral
            .push((tarea.clone(), module_type_id, instructions.to_string()));
        Ok(tables.next_id)
    }

    async fn recreate_writing_tables(&self) -> Result<(), DocumentError> {
        let mut tables = self.tables.lock().unwrap();
        tables.writing.clear();
        tables.next_id = 0;
        tables.recreated += 1;
        Ok(())
    }
}
