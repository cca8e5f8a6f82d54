//! Record types of the backend that carry uploaded media.

use crate::registry::{Persisted, Registry};
use media_api::FieldDescriptor;

pub struct Visit;
pub struct Place;
pub struct Article;
pub struct Action;
pub struct Partner;
pub struct Project;
pub struct Edition;
pub struct Document;
pub struct FormFile;

impl Persisted for Visit {
    const TABLE: &'static str = "visits";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("title"),
            FieldDescriptor::markdown("description"),
            FieldDescriptor::file("image"),
            FieldDescriptor::file("fact_sheet"),
            FieldDescriptor::file("context_sheet"),
            FieldDescriptor::file("permission"),
        ]
    }
}

impl Persisted for Place {
    const TABLE: &'static str = "places";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("name"),
            FieldDescriptor::markdown("description"),
        ]
    }
}

impl Persisted for Article {
    const TABLE: &'static str = "articles";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("title"),
            FieldDescriptor::markdown("content"),
            FieldDescriptor::file("image"),
        ]
    }
}

impl Persisted for Action {
    const TABLE: &'static str = "actions";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("title"),
            FieldDescriptor::file("thumbnail"),
            FieldDescriptor::markdown("description"),
        ]
    }
}

impl Persisted for Partner {
    const TABLE: &'static str = "partners";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("name"),
            FieldDescriptor::file("logo"),
        ]
    }
}

impl Persisted for Project {
    const TABLE: &'static str = "projects";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("name"),
            FieldDescriptor::markdown("description"),
            FieldDescriptor::file("logo"),
        ]
    }
}

impl Persisted for Edition {
    const TABLE: &'static str = "editions";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("name"),
            FieldDescriptor::markdown("description"),
        ]
    }
}

impl Persisted for Document {
    const TABLE: &'static str = "documents";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::other("title"),
            FieldDescriptor::markdown("content"),
        ]
    }
}

impl Persisted for FormFile {
    const TABLE: &'static str = "form_files";

    fn fields() -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::file("file")]
    }
}

/// Registry with every media-bearing record type of the backend.
pub fn backend_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register::<Visit>()
        .register::<Place>()
        .register::<Article>()
        .register::<Action>()
        .register::<Partner>()
        .register::<Project>()
        .register::<Edition>()
        .register::<Document>()
        .register::<FormFile>();
    registry
}
