/**
 * METRIC TEMPLATE - Compiles the export template into skeletons + mapping tables
 *
 * ROLE :
 * The template is a JSON document shaped like the container document served to
 * consumers. Some leaves are value specs telling where a measurement goes.
 *
 * HOW IT WORKS :
 * - `/stats` holds exactly one sample template, `/network/interfaces` inside it
 *   exactly one interface template; both are cut out of their parent
 * - each of the three regions is walked independently to collect its specs
 * - spec leaves are then replaced by their defaults (or dropped) to give the
 *   skeleton cloned for every new container / sample / interface
 */

mod spec;

pub use spec::{MappingTable, TemplateSpec, TMPL_MARKER};

use crate::error::TemplateError;
use crate::models::Node;
use crate::walker::{self, Walk};
use std::path::PathBuf;
use tracing::debug;

pub const SAMPLES_PATH: &str = "/stats";
pub const INTERFACES_PATH: &str = "/network/interfaces";
pub const BUILTIN_TEMPLATE_NAME: &str = "builtin";

const BUILTIN_TEMPLATE: &str = include_str!("builtin.json");

/// Raw text of the embedded default template.
pub fn builtin_source() -> &'static str {
    BUILTIN_TEMPLATE
}

/// Where the template text comes from (`export_tmpl_file` option).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TemplateSource {
    #[default]
    Builtin,
    File(PathBuf),
}

impl TemplateSource {
    pub fn from_option(value: &str) -> Self {
        if value == BUILTIN_TEMPLATE_NAME {
            TemplateSource::Builtin
        } else {
            TemplateSource::File(PathBuf::from(value))
        }
    }

    pub fn load(&self) -> Result<String, TemplateError> {
        match self {
            TemplateSource::Builtin => Ok(BUILTIN_TEMPLATE.to_string()),
            TemplateSource::File(path) => Ok(std::fs::read_to_string(path)?),
        }
    }

    pub fn compile(&self) -> Result<CompiledTemplate, TemplateError> {
        CompiledTemplate::compile(&self.load()?)
    }
}

/// Skeleton plus mapping table for one nesting level.
#[derive(Debug, Clone)]
pub struct Region {
    pub skeleton: Node,
    pub mapping: MappingTable,
}

impl Region {
    fn compile(mut doc: Node) -> Result<Self, TemplateError> {
        let mapping = extract_mapping(&doc)?;
        apply_defaults(&mut doc, &mapping)?;
        Ok(Self { skeleton: doc, mapping })
    }

    /// Fresh instance of the skeleton.
    pub fn instantiate(&self) -> Node {
        self.skeleton.clone()
    }
}

/// The three compiled regions. Read-only once built; a reload swaps the whole
/// value.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub container: Region,
    pub sample: Region,
    pub interface: Region,
}

impl CompiledTemplate {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut container_doc = Node::parse(source)?;
        if !container_doc.is_map() {
            return Err(TemplateError::Schema("template root must be an object".into()));
        }
        let mut sample_doc = take_single_template(&mut container_doc, SAMPLES_PATH, Node::List(Vec::new()))?;
        let interface_doc = take_single_template(&mut sample_doc, INTERFACES_PATH, Node::empty_map())?;

        let compiled = Self {
            container: Region::compile(container_doc)?,
            sample: Region::compile(sample_doc)?,
            interface: Region::compile(interface_doc)?,
        };
        debug!(
            container_specs = compiled.container.mapping.len(),
            sample_specs = compiled.sample.mapping.len(),
            interface_specs = compiled.interface.mapping.len(),
            "compiled metric template"
        );
        Ok(compiled)
    }

    pub fn builtin() -> Result<Self, TemplateError> {
        Self::compile(BUILTIN_TEMPLATE)
    }
}

/// Cuts the single template element out of the list at `path`, leaving
/// `replacement` in its place.
fn take_single_template(doc: &mut Node, path: &str, replacement: Node) -> Result<Node, TemplateError> {
    let slot = walker::seek_mut(doc, path)
        .map_err(|_| TemplateError::Schema(format!("template has no {path} list")))?;
    let Node::List(items) = &mut *slot else {
        return Err(TemplateError::Schema(format!("{path} must be a list")));
    };
    if items.len() != 1 {
        return Err(TemplateError::Schema(format!(
            "{path} must hold exactly one template element, found {}",
            items.len()
        )));
    }
    let element = items.remove(0);
    *slot = replacement;
    Ok(element)
}

fn extract_mapping(doc: &Node) -> Result<MappingTable, TemplateError> {
    let mut mapping = MappingTable::default();
    let mut failure = None;
    walker::walk(doc, &mut |path, node| {
        if failure.is_some() {
            return Walk::Prune;
        }
        match TemplateSpec::from_node(path, node) {
            Ok(Some(spec)) => {
                mapping.register(spec);
                // full specs are maps with no further schema below them
                if node.is_map() {
                    Walk::Prune
                } else {
                    Walk::Continue
                }
            }
            Ok(None) => Walk::Continue,
            Err(e) => {
                failure = Some(e);
                Walk::Prune
            }
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(mapping),
    }
}

fn apply_defaults(doc: &mut Node, mapping: &MappingTable) -> Result<(), TemplateError> {
    for spec in mapping.specs() {
        match &spec.default_value {
            Some(value) => walker::set(doc, &spec.target_path, Node::Leaf(value.clone()))?,
            None => {
                walker::remove(doc, &spec.target_path)?;
            }
        }
    }
    Ok(())
}
