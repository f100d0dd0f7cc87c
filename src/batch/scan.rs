//! Work-item discovery

use crate::batch::engine::WorkItem;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

fn is_dicom(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            debug!("Skipping unreadable directory {}: {e}", dir.display());
            return Vec::new();
        }
    };
    entries.sort();
    entries
}

/// `depth` is the depth of `dir` itself, with `data_dir` at 0
fn collect(dir: &Path, depth: usize, max_depth: usize, items: &mut Vec<WorkItem>) {
    for path in sorted_entries(dir).into_iter().filter(|p| p.is_dir()) {
        if sorted_entries(&path).iter().any(|p| is_dicom(p)) {
            items.push(WorkItem::from_path(&path));
        } else if depth < max_depth {
            collect(&path, depth + 1, max_depth, items);
        }
    }
}

/// Find study folders under `data_dir`.
///
/// A directory holding at least one `.dcm` file is one item, identified by
/// its folder name. Other directories are descended into while their own
/// depth is at most `max_depth`, so items are found up to `max_depth + 1`
/// levels below `data_dir`.
pub fn scan_items(data_dir: &Path, max_depth: usize) -> Vec<WorkItem> {
    if !data_dir.is_dir() {
        error!("Data directory not found: {}", data_dir.display());
        return Vec::new();
    }

    let mut items = Vec::new();
    collect(data_dir, 0, max_depth, &mut items);
    info!("Found {} items under {}", items.len(), data_dir.display());
    items
}
