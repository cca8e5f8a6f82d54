use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a persisted column relates to uploaded media.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Holds a storage-relative path to an uploaded file, or nothing.
    File,
    /// Holds free Markdown text that may embed `[legend](path)` references.
    Markdown,
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::File)
    }

    pub fn markdown(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Markdown)
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Other)
    }
}

/// A persisted record type and the descriptors of its columns.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn fields_of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }

    pub fn file_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields_of_kind(FieldKind::File)
    }

    pub fn markdown_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields_of_kind(FieldKind::Markdown)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Row predicate understood by every catalogue backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    NullOrEmpty(String),
    Not(Box<Filter>),
    /// Logical OR. An empty list matches nothing.
    Any(Vec<Filter>),
}

impl Filter {
    pub fn null_or_empty(column: impl Into<String>) -> Self {
        Filter::NullOrEmpty(column.into())
    }

    /// Column is neither null nor the empty string.
    pub fn present(column: impl Into<String>) -> Self {
        Filter::Not(Box::new(Filter::null_or_empty(column)))
    }

    pub fn any<I: IntoIterator<Item = Filter>>(filters: I) -> Self {
        Filter::Any(filters.into_iter().collect())
    }

    /// Evaluate the predicate against a row, given a column lookup.
    pub fn matches<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        match self {
            Filter::All => true,
            Filter::NullOrEmpty(column) => lookup(column).map_or(true, str::is_empty),
            Filter::Not(inner) => !inner.matches(lookup),
            Filter::Any(list) => list.iter().any(|f| f.matches(lookup)),
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogueError {
    #[error("unknown record type {0}")]
    UnknownRecord(String),

    #[error("column {column} is not part of {record}")]
    UnknownColumn { record: String, column: String },

    #[error("column {record}.{column} is declared as {declared}, expected text")]
    UnsupportedColumn {
        record: String,
        column: String,
        declared: String,
    },

    #[error("column {record}.{column} holds a non-text value")]
    UnsupportedValue { record: String, column: String },

    #[error("catalogue backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CatalogueError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CatalogueError::Backend(Box::new(err))
    }
}

/// Read access to every persisted record type and its column values.
pub trait RecordCatalogue: Send + Sync {
    fn record_types(&self) -> Vec<RecordType>;

    /// Values of `column` for every row of `record` matching `filter`,
    /// distinct, `None` for null.
    fn column_values(
        &self,
        record: &RecordType,
        column: &str,
        filter: &Filter,
    ) -> Result<Vec<Option<String>>, CatalogueError>;
}

/// Content of a single storage directory. Names are bare entry names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    #[error("storage error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// File storage addressed by `/`-separated paths relative to its root.
/// The empty path is the root itself.
pub trait Storage: Send + Sync {
    /// Human readable root location, used in logs.
    fn location(&self) -> String;

    fn list_dir(&self, path: &str) -> Result<Listing, StorageError>;

    fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Delete a file or an empty directory. Missing entries yield
    /// [`StorageError::NotFound`].
    fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Join a storage directory and an entry name.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
