//! Workflow listing

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use vflow_e2e::vsphere::builtin_catalog;
use vflow_e2e::WorkflowMetadata;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only list workflows carrying this tag
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Serialize)]
pub struct WorkflowRow {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
}

impl From<WorkflowMetadata> for WorkflowRow {
    fn from(metadata: WorkflowMetadata) -> Self {
        Self {
            id: metadata.id,
            title: metadata.title,
            tags: metadata.tags,
        }
    }
}

impl TableDisplay for WorkflowRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Title", "Tags"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.id.clone(), self.title.clone(), self.tags.join(", ")]
    }
}

pub fn execute(args: ListArgs, format: OutputFormat) -> Result<()> {
    let catalog = builtin_catalog()?;
    let rows: Vec<WorkflowRow> = catalog
        .metadata()
        .into_iter()
        .filter(|m| args.tag.as_deref().map_or(true, |tag| m.has_tag(tag)))
        .map(WorkflowRow::from)
        .collect();
    print_list(&rows, format);
    Ok(())
}
