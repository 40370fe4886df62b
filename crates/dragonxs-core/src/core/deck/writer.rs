use super::groups::{GroupStructure, GroupStructureError};
use super::template::{JinjaRenderer, NoHook, TemplateData, TemplateDataHook, TemplateError, TemplateRenderer};
use crate::core::composition::{CompositionError, CompositionUnit};
use crate::core::mixture::{MixingOptions, Mixture};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// DRAGON input files cannot reference data files with longer names than this.
pub const DEFAULT_MAX_LIBRARY_NAME_CHARS: usize = 8;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    GroupStructure(#[from] GroupStructureError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Failed to write deck '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Keeps the trailing `max_chars` characters of a library file name.
///
/// Distinguishing content of DRAGLIB names (evaluation, group structure) sits at the end.
pub fn short_library_name(name: &str, max_chars: usize) -> String {
    let count = name.chars().count();
    name.chars().skip(count.saturating_sub(max_chars)).collect()
}

/// Settings shared by every deck of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckOptions {
    pub library_path: PathBuf,
    pub max_library_name_chars: usize,
    pub group_structure: GroupStructure,
    pub critical_buckling: bool,
    pub nuclides: Vec<String>,
    pub mixing: MixingOptions,
}

impl DeckOptions {
    pub fn library_file_name(&self) -> String {
        self.library_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The name the data library carries inside the solver's working area.
    pub fn short_library_name(&self) -> String {
        short_library_name(&self.library_file_name(), self.max_library_name_chars)
    }
}

/// One solver case: every unit sharing a cross-section id, in deterministic order.
pub struct DeckCase<'a> {
    pub xs_id: &'a str,
    pub units: &'a [&'a dyn CompositionUnit],
}

/// Produces a solver input deck for one case.
pub trait DeckWriter: Send + Sync {
    fn render(&self, case: &DeckCase<'_>) -> Result<String, DeckError>;

    fn write(&self, case: &DeckCase<'_>, path: &Path) -> Result<(), DeckError> {
        let text = self.render(case)?;
        std::fs::write(path, text).map_err(|e| DeckError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(xs_id = case.xs_id, path = %path.display(), "Wrote DRAGON input deck.");
        Ok(())
    }
}

/// Writes homogenized decks: each unit of a case becomes one `MIX` card.
pub struct HomogenizedDeckWriter<R = JinjaRenderer, H = NoHook> {
    template: String,
    options: DeckOptions,
    renderer: R,
    hook: H,
}

impl HomogenizedDeckWriter {
    pub fn new(template: String, options: DeckOptions) -> Self {
        Self {
            template,
            options,
            renderer: JinjaRenderer::new(),
            hook: NoHook,
        }
    }
}

impl<R: TemplateRenderer, H: TemplateDataHook> HomogenizedDeckWriter<R, H> {
    pub fn with_renderer<R2: TemplateRenderer>(self, renderer: R2) -> HomogenizedDeckWriter<R2, H> {
        HomogenizedDeckWriter {
            template: self.template,
            options: self.options,
            renderer,
            hook: self.hook,
        }
    }

    pub fn with_hook<H2: TemplateDataHook>(self, hook: H2) -> HomogenizedDeckWriter<R, H2> {
        HomogenizedDeckWriter {
            template: self.template,
            options: self.options,
            renderer: self.renderer,
            hook,
        }
    }

    pub fn options(&self) -> &DeckOptions {
        &self.options
    }

    /// Builds the data mapping for `case`, after the hook has amended it.
    pub fn template_data(&self, case: &DeckCase<'_>) -> Result<TemplateData, DeckError> {
        let mut mixtures = Vec::with_capacity(case.units.len());
        for (position, unit) in case.units.iter().enumerate() {
            let data = Mixture::new(*unit, position).to_data(&self.options.nuclides, &self.options.mixing)?;
            debug!(
                xs_id = case.xs_id,
                unit = unit.name(),
                nuclides = data.nuclides.len(),
                "Built mixture records."
            );
            mixtures.push(data);
        }

        let mut data = TemplateData::new();
        data.insert("xs_id".to_string(), Value::from(case.xs_id));
        data.insert("nuc_data".to_string(), Value::from(self.options.short_library_name()));
        data.insert(
            "nuc_data_comment".to_string(),
            Value::from(self.options.library_path.to_string_lossy().into_owned()),
        );
        data.insert(
            "group_structure".to_string(),
            serde_json::to_value(self.options.group_structure.inner_boundaries()?)
                .map_err(TemplateError::from)?,
        );
        data.insert(
            "mixtures".to_string(),
            serde_json::to_value(&mixtures).map_err(TemplateError::from)?,
        );
        data.insert("buckling".to_string(), Value::from(self.options.critical_buckling));

        self.hook.amend(&mut data);
        Ok(data)
    }
}

impl<R: TemplateRenderer, H: TemplateDataHook> DeckWriter for HomogenizedDeckWriter<R, H> {
    fn render(&self, case: &DeckCase<'_>) -> Result<String, DeckError> {
        let data = self.template_data(case)?;
        Ok(self.renderer.render(&self.template, &data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::composition::{Block, Component};
    use crate::core::deck::template::DEFAULT_TEMPLATE;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn block(name: &str, density: f64, contents: &[(&str, f64)]) -> Block {
        Block {
            name: name.to_string(),
            xs_id: "AA".to_string(),
            density,
            components: vec![Component {
                name: "fuel".to_string(),
                is_fuel: true,
                area: 1.0,
                temperature_c: 626.85,
                thermal_scattering: Vec::new(),
                number_densities: contents
                    .iter()
                    .map(|(n, d)| (n.to_string(), *d))
                    .collect::<BTreeMap<_, _>>(),
            }],
        }
    }

    fn options() -> DeckOptions {
        DeckOptions {
            library_path: PathBuf::from("/data/draglibendfb7r1SHEM361"),
            max_library_name_chars: DEFAULT_MAX_LIBRARY_NAME_CHARS,
            group_structure: GroupStructure::Named("FAST4".to_string()),
            critical_buckling: true,
            nuclides: vec!["U235".to_string(), "FE56".to_string(), "LFP35".to_string()],
            mixing: MixingOptions::default(),
        }
    }

    #[test]
    fn short_names_keep_trailing_characters() {
        assert_eq!(short_library_name("draglibendfb7r1SHEM361", 8), "1SHEM361");
        assert_eq!(short_library_name("SHORT", 8), "SHORT");
        assert_eq!(options().short_library_name(), "1SHEM361");
    }

    #[test]
    fn template_data_contains_every_key() {
        let a = block("B1", 10.0, &[("U235", 0.01), ("FE56", 0.05)]);
        let units: [&dyn CompositionUnit; 1] = [&a];
        let writer = HomogenizedDeckWriter::new(DEFAULT_TEMPLATE.to_string(), options());
        let data = writer
            .template_data(&DeckCase { xs_id: "AA", units: &units })
            .unwrap();

        assert_eq!(data["xs_id"], json!("AA"));
        assert_eq!(data["nuc_data"], json!("1SHEM361"));
        assert_eq!(data["nuc_data_comment"], json!("/data/draglibendfb7r1SHEM361"));
        assert_eq!(data["group_structure"], json!([8.2085e5, 1.1109e5, 1.2341e3]));
        assert_eq!(data["buckling"], json!(true));
        assert_eq!(data["mixtures"][0]["nuclides"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn units_in_one_case_get_distinct_self_shield_regions() {
        let a = block("B1", 10.0, &[("U235", 0.01), ("FE56", 0.05)]);
        let b = block("B2", 10.0, &[("FE56", 0.08)]);
        let units: [&dyn CompositionUnit; 2] = [&a, &b];
        let writer = HomogenizedDeckWriter::new(DEFAULT_TEMPLATE.to_string(), options());
        let data = writer
            .template_data(&DeckCase { xs_id: "AA", units: &units })
            .unwrap();

        assert_eq!(data["mixtures"][0]["nuclides"][1]["self_shield_index"], json!("1"));
        assert_eq!(data["mixtures"][1]["nuclides"][0]["self_shield_index"], json!("2"));
    }

    #[test]
    fn default_template_renders_mix_cards() {
        let a = block("B1", 10.0, &[("U235", 0.01), ("FE56", 0.05)]);
        let units: [&dyn CompositionUnit; 1] = [&a];
        let writer = HomogenizedDeckWriter::new(DEFAULT_TEMPLATE.to_string(), options());
        let deck = writer.render(&DeckCase { xs_id: "AA", units: &units }).unwrap();

        assert!(deck.contains("FIL: 1SHEM361"));
        assert!(deck.contains("U235AA = 'U235' 0.01 1"));
        assert!(deck.contains("FE56AA = 'Fe56' 0.05 1"));
        assert!(deck.contains("TYPE B B1 SIGS"));
        assert!(!deck.contains("14191000"));
    }

    #[test]
    fn zero_area_units_render_as_empty_mixtures() {
        let mut a = block("B0", 10.0, &[("U235", 0.01)]);
        a.components[0].area = 0.0;
        let units: [&dyn CompositionUnit; 1] = [&a];
        let writer = HomogenizedDeckWriter::new(DEFAULT_TEMPLATE.to_string(), options());
        let deck = writer.render(&DeckCase { xs_id: "AA", units: &units }).unwrap();

        assert!(deck.contains("MIX 1 293.6"));
        assert!(!deck.contains("U235AA"));
    }

    #[test]
    fn hooks_can_add_keys_the_template_needs() {
        let a = block("B1", 10.0, &[("U235", 0.01)]);
        let units: [&dyn CompositionUnit; 1] = [&a];
        let template = "{{ xs_id }} {{ pitch }}".to_string();

        let bare = HomogenizedDeckWriter::new(template.clone(), options());
        assert!(matches!(
            bare.render(&DeckCase { xs_id: "AA", units: &units }),
            Err(DeckError::Template(TemplateError::Render(_)))
        ));

        let hooked = HomogenizedDeckWriter::new(template, options()).with_hook(|data: &mut TemplateData| {
            data.insert("pitch".to_string(), json!(1.26));
        });
        assert_eq!(
            hooked.render(&DeckCase { xs_id: "AA", units: &units }).unwrap(),
            "AA 1.26"
        );
    }

    #[test]
    fn write_puts_the_deck_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dragonAA.x2m");
        let a = block("B1", 10.0, &[("U235", 0.01)]);
        let units: [&dyn CompositionUnit; 1] = [&a];
        HomogenizedDeckWriter::new("* {{ xs_id }}\n".to_string(), options())
            .write(&DeckCase { xs_id: "AA", units: &units }, &path)
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "* AA\n");
    }
}
