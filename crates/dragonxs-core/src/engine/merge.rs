use super::error::EngineError;
use crate::core::library::codec::LibraryCodec;
use crate::core::library::model::{MergeConflictError, XsLibrary};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Aggregate values derived from the merged library.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeSummary {
    /// Group-wise neutron velocity of each cross-section id.
    pub neutron_velocities: BTreeMap<String, Vec<f64>>,
    pub nuclides_per_xs_id: BTreeMap<String, usize>,
}

impl MergeSummary {
    fn of(library: &XsLibrary) -> Self {
        let mut nuclides_per_xs_id = BTreeMap::new();
        for entry in &library.nuclides {
            *nuclides_per_xs_id.entry(entry.xs_id.clone()).or_insert(0) += 1;
        }
        Self {
            neutron_velocities: library.neutron_velocities(),
            nuclides_per_xs_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedLibrary {
    pub library: XsLibrary,
    pub summary: MergeSummary,
    /// The per-task libraries, keyed by the cross-section id they were merged under.
    pub sources: BTreeMap<String, PathBuf>,
}

impl MergedLibrary {
    /// Writes the velocity summary as `xs_id,group,velocity` rows.
    pub fn write_velocity_csv(&self, path: &Path) -> Result<(), EngineError> {
        let csv_error = |e| EngineError::Csv {
            path: path.to_path_buf(),
            source: e,
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
        writer
            .write_record(["xs_id", "group", "velocity"])
            .map_err(csv_error)?;
        for (xs_id, velocities) in &self.summary.neutron_velocities {
            for (group, velocity) in velocities.iter().enumerate() {
                writer
                    .write_record([xs_id.clone(), (group + 1).to_string(), format!("{velocity:e}")])
                    .map_err(csv_error)?;
            }
        }
        writer.flush().map_err(|e| EngineError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Combines per-task output libraries into one.
///
/// Libraries are merged in cross-section id order, so the result does not
/// depend on the order in which tasks completed.
pub struct ResultMerger<'a> {
    codec: &'a dyn LibraryCodec,
}

impl<'a> ResultMerger<'a> {
    pub fn new(codec: &'a dyn LibraryCodec) -> Self {
        Self { codec }
    }

    #[instrument(skip_all, name = "result_merge", fields(libraries = sources.len()))]
    pub fn merge(&self, sources: &[(String, PathBuf)]) -> Result<MergedLibrary, EngineError> {
        let mut by_xs_id: BTreeMap<String, PathBuf> = BTreeMap::new();
        for (xs_id, path) in sources {
            match by_xs_id.entry(xs_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(path.clone());
                }
                Entry::Occupied(_) => {
                    return Err(MergeConflictError::DuplicateSource { xs_id: xs_id.clone() }.into());
                }
            }
        }

        let mut library = XsLibrary::default();
        for (xs_id, path) in &by_xs_id {
            let mut partial = self.codec.read(path)?;
            if partial.xs_id.is_none() {
                partial.xs_id = Some(xs_id.clone());
            }
            debug!(xs_id = %xs_id, nuclides = partial.nuclides.len(), "Merging library.");
            library.merge(partial)?;
        }

        let summary = MergeSummary::of(&library);
        info!(
            xs_ids = summary.nuclides_per_xs_id.len(),
            nuclides = library.nuclides.len(),
            groups = library.groups,
            "Merged cross-section libraries."
        );
        Ok(MergedLibrary {
            library,
            summary,
            sources: by_xs_id,
        })
    }
}
