//! Candidate sources: where the records to reconcile come from.
//!
//! A source splits its content into work units; each unit is built into a
//! fresh [`RecordSet`] and reconciled as one pass.

use std::collections::VecDeque;

use tally_core::{A1Range, FieldKind, FieldSpec, Record, RecordSet, Schema, Value};

use crate::drive::{FileStore, FolderTree, TreeItem};
use crate::error::SourceError;
use crate::sheets::Workbook;

pub trait CandidateSource {
    type Unit;

    /// Work units in processing order.
    fn units(&self) -> Result<Vec<Self::Unit>, SourceError>;

    /// Short human-readable name of `unit` for logs and reports.
    fn label(&self, unit: &Self::Unit) -> String;

    fn build(&self, unit: &Self::Unit) -> Result<RecordSet, SourceError>;
}

// ---------------------------------------------------------------------------
// Sheet
// ---------------------------------------------------------------------------

/// A sheet range whose first row is the header. One work unit.
pub struct SheetSource<'w> {
    workbook: &'w dyn Workbook,
    range: A1Range,
    schema: &'w Schema,
}

impl<'w> SheetSource<'w> {
    pub fn new(workbook: &'w dyn Workbook, range: A1Range, schema: &'w Schema) -> Self {
        Self {
            workbook,
            range,
            schema,
        }
    }
}

impl CandidateSource for SheetSource<'_> {
    type Unit = ();

    fn units(&self) -> Result<Vec<()>, SourceError> {
        Ok(vec![()])
    }

    fn label(&self, _unit: &()) -> String {
        self.range.to_string()
    }

    fn build(&self, _unit: &()) -> Result<RecordSet, SourceError> {
        let rows = self.workbook.read(&self.range)?;
        let ingested = self.schema.ingest(&rows, self.range.first_row())?;
        for rejection in &ingested.rejected {
            tracing::warn!(
                "row {} skipped: {} '{}' is not a valid {:?}",
                rejection.row_number,
                rejection.field,
                rejection.raw,
                rejection.expected
            );
        }
        tracing::debug!("read {} row(s) from {}", ingested.records.len(), self.range);
        Ok(ingested.records)
    }
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// A stored file holding a JSON array of objects. One work unit.
pub struct JsonFileSource<'f> {
    files: &'f dyn FileStore,
    file_id: String,
    schema: &'f Schema,
}

impl<'f> JsonFileSource<'f> {
    pub fn new(files: &'f dyn FileStore, file_id: impl Into<String>, schema: &'f Schema) -> Self {
        Self {
            files,
            file_id: file_id.into(),
            schema,
        }
    }

    fn malformed(&self, message: impl Into<String>) -> SourceError {
        SourceError::Malformed {
            file: self.file_id.clone(),
            message: message.into(),
        }
    }
}

impl CandidateSource for JsonFileSource<'_> {
    type Unit = ();

    fn units(&self) -> Result<Vec<()>, SourceError> {
        Ok(vec![()])
    }

    fn label(&self, _unit: &()) -> String {
        format!("file {}", self.file_id)
    }

    fn build(&self, _unit: &()) -> Result<RecordSet, SourceError> {
        let body = self.files.download(&self.file_id)?;
        let parsed: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| self.malformed(e.to_string()))?;
        let serde_json::Value::Array(items) = parsed else {
            return Err(self.malformed("top level is not an array"));
        };
        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match item {
                serde_json::Value::Object(object) => records.push(Record::from_json_object(object)),
                other => return Err(self.malformed(format!("item {i} is {other}, not an object"))),
            }
        }
        let mut set = RecordSet::from_records(records);
        let unconverted = self.schema.conform_set(&mut set);
        if unconverted > 0 {
            tracing::warn!("{unconverted} field(s) in {} did not match the schema type", self.file_id);
        }
        tracing::debug!("read {} record(s) from file {}", set.len(), self.file_id);
        Ok(set)
    }
}

// ---------------------------------------------------------------------------
// Folder tree
// ---------------------------------------------------------------------------

pub const GROUP_FIELD: &str = "admissions-group-name";
pub const UPLOADED_STATUS: &str = "Uploaded";
const FOLDER_DOC_TYPE: &str = "Folder";

/// Fields of every record produced by [`TreeSource`], in order.
pub const TREE_FIELDS: [&str; 8] = [
    GROUP_FIELD,
    "doc-type",
    "document-link",
    "fileorfolder-id",
    "folder-link",
    "name",
    "status",
    "uploaded-date",
];

/// Schema of [`TreeSource`] records.
pub fn tree_schema() -> Schema {
    Schema::new(
        TREE_FIELDS
            .iter()
            .map(|name| {
                let kind = if *name == "uploaded-date" {
                    FieldKind::Date
                } else {
                    FieldKind::Text
                };
                FieldSpec::new(*name, kind)
            })
            .collect(),
    )
}

/// A run of consecutive top-level folders reconciled together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderGroup {
    /// 0-based index of the first folder among all top-level folders.
    pub start: usize,
    pub total: usize,
    pub folders: Vec<TreeItem>,
}

/// Every top-level folder under a root is one entity group; its whole
/// subtree becomes one record per file and folder.
pub struct TreeSource<'t> {
    tree: &'t dyn FolderTree,
    root_folder_id: String,
    group_size: usize,
}

impl<'t> TreeSource<'t> {
    pub fn new(tree: &'t dyn FolderTree, root_folder_id: impl Into<String>, group_size: usize) -> Self {
        Self {
            tree,
            root_folder_id: root_folder_id.into(),
            group_size: group_size.max(1),
        }
    }

    /// Records for one top-level folder and everything below it.
    pub fn walk(&self, group: &TreeItem) -> Result<RecordSet, SourceError> {
        let mut out = RecordSet::with_fields(TREE_FIELDS);
        let mut queue = VecDeque::from([(group.clone(), true)]);

        while let Some((folder, is_group)) = queue.pop_front() {
            let children = self.tree.list(&folder.id)?;
            // An empty group folder produces nothing, not even itself.
            if is_group && !children.is_empty() {
                out.push(tree_record(&group.name, FOLDER_DOC_TYPE, "", &folder, folder.link()));
            }
            for child in children {
                if child.is_folder() {
                    out.push(tree_record(&group.name, FOLDER_DOC_TYPE, "", &child, child.link()));
                    queue.push_back((child, false));
                } else {
                    out.push(tree_record(&group.name, &folder.name, child.link(), &child, folder.link()));
                }
            }
        }
        tracing::debug!("{}: {} item(s)", group.name, out.len());
        Ok(out)
    }
}

fn tree_record(group: &str, doc_type: &str, document_link: &str, item: &TreeItem, folder_link: &str) -> Record {
    let text = |s: &str| if s.is_empty() { Value::Null } else { Value::from(s) };
    let mut record = Record::new();
    record.insert(GROUP_FIELD, group);
    record.insert("doc-type", doc_type);
    record.insert("document-link", text(document_link));
    record.insert("fileorfolder-id", item.id.as_str());
    record.insert("folder-link", text(folder_link));
    record.insert("name", item.name.as_str());
    record.insert("status", UPLOADED_STATUS);
    record.insert("uploaded-date", item.created_date());
    record
}

impl CandidateSource for TreeSource<'_> {
    type Unit = FolderGroup;

    fn units(&self) -> Result<Vec<FolderGroup>, SourceError> {
        let folders: Vec<TreeItem> = self
            .tree
            .list(&self.root_folder_id)?
            .into_iter()
            .filter(TreeItem::is_folder)
            .collect();
        let total = folders.len();
        tracing::info!("{total} top-level folder(s) under {}", self.root_folder_id);
        Ok(folders
            .chunks(self.group_size)
            .enumerate()
            .map(|(i, chunk)| FolderGroup {
                start: i * self.group_size,
                total,
                folders: chunk.to_vec(),
            })
            .collect())
    }

    fn label(&self, unit: &FolderGroup) -> String {
        format!(
            "folders {}-{} of {}",
            unit.start + 1,
            unit.start + unit.folders.len(),
            unit.total
        )
    }

    fn build(&self, unit: &FolderGroup) -> Result<RecordSet, SourceError> {
        let mut out = RecordSet::with_fields(TREE_FIELDS);
        for folder in &unit.folders {
            out.append(self.walk(folder)?);
        }
        Ok(out)
    }
}
