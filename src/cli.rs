//! CLI: reflected model | schema set → (mapping graph | schema set)
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Options;
use crate::mapping::MappingGraph;
use crate::mapping::dump::Shape;
use crate::model::reflected::ReflectedModel;
use crate::names::{QualifiedName, XmlForm};
use crate::reflection::ReflectionImporter;
use crate::schema_export::SchemaExporter;
use crate::schema_import::SchemaImporter;
use crate::xsd::{XmlSchema, XmlSchemaSet};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile reflected object models or XML schema sets into XML mapping graphs, and mapping graphs back into schemas
#[derive(Parser, Debug)]
#[command(name = "xsd-map")]
pub struct CommandLineInterface {
    /// log filter, e.g. `debug` or `xsd_map::reflection=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// import a reflected model
    Reflect(ReflectOut),
    /// import a schema set
    Schema(SchemaOut),
    /// import a reflected model, export it, re-import the schema and compare
    Roundtrip(RoundtripOut),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// the mapping graph dump
    Graph,
    /// the exported schema set
    Schema,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to select a subnode in each document (e.g. /data/model)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document; every output is compiled on its own
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct SessionSettings {
    /// JSON options file ({"import": {...}, "export": {...}}); flags below win
    #[arg(long)]
    options: Option<PathBuf>,

    /// struct nesting depth after which member population is deferred
    #[arg(long)]
    recursion_limit: Option<usize>,

    /// namespace for elements and types that name none
    #[arg(long)]
    default_namespace: Option<String>,

    /// struct mappings accept unknown content
    #[arg(long)]
    open_model: bool,

    /// exported schemas default local elements to unqualified
    #[arg(long)]
    unqualified_elements: bool,

    /// exported schemas default local attributes to qualified
    #[arg(long)]
    qualified_attributes: bool,
}

#[derive(clap::Parser, Debug)]
struct ReflectOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    session: SessionSettings,

    /// types to import as top-level elements (every model type if omitted)
    #[arg(long = "type")]
    types: Vec<String>,

    /// types imported without an element so they join their base's derived types
    #[arg(long)]
    include: Vec<String>,

    #[arg(long, value_enum, default_value_t = Emit::Graph)]
    emit: Emit,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    session: SessionSettings,

    /// top-level elements to import, in `{namespace}name` form (all if omitted)
    #[arg(long = "element")]
    elements: Vec<QualifiedName>,

    #[arg(long, value_enum, default_value_t = Emit::Graph)]
    emit: Emit,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct RoundtripOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    session: SessionSettings,

    /// types to import as top-level elements (every model type if omitted)
    #[arg(long = "type")]
    types: Vec<String>,

    /// output .json report (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    /// Every document selected from every input; files are read in parallel.
    fn load_documents<T>(&self) -> Result<Vec<(String, T)>>
    where
        T: DeserializeOwned + Send,
    {
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        let per_file = source_paths
            .par_iter()
            .map(|path| self.load_file::<T>(path))
            .collect::<Result<Vec<_>>>()?;
        Ok(per_file.into_iter().flatten().collect())
    }

    fn load_file<T: DeserializeOwned>(&self, source_path: &Path) -> Result<Vec<(String, T)>> {
        let source_path_str = source_path.to_string_lossy().to_string();
        let source = std::fs::read_to_string(source_path)
            .with_context(|| format!("failed to read source file ({source_path_str})"))?;
        let mut json_value = serde_json::from_str::<Value>(&source)
            .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
        if let Some(pointer) = self.json_pointer.as_ref() {
            json_value = json_value
                .pointer_mut(pointer)
                .map(Value::take)
                .ok_or_else(|| anyhow!("JSON pointer {pointer} selects nothing in {source_path_str}"))?;
        }
        let values = match self.jq_expr.as_ref() {
            None => vec![json_value],
            Some(jq_expr) => crate::jq_exec::run_jaq(jq_expr, &json_value)
                .with_context(|| format!("failed to apply jq expression to source file ({source_path_str})"))?,
        };
        let count = values.len();
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let label = if count == 1 { source_path_str.clone() } else { format!("{source_path_str}#{index}") };
                let document = crate::path_de::from_value_with_path::<T>(value)
                    .map_err(|error| anyhow!("invalid document ({label}): {error}"))?;
                Ok((label, document))
            })
            .collect()
    }
}

impl SessionSettings {
    fn resolve(&self) -> Result<Options> {
        let mut options = match self.options.as_ref() {
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read options file ({})", path.display()))?;
                crate::path_de::from_str_with_path::<Options>(&source)
                    .map_err(|error| anyhow!("invalid options file ({}): {error}", path.display()))?
            }
            None => Options::default(),
        };
        if let Some(limit) = self.recursion_limit {
            options.import.recursion_limit = limit;
        }
        if let Some(ns) = self.default_namespace.as_ref() {
            options.import.default_namespace = Some(ns.clone());
        }
        options.import.open_model |= self.open_model;
        if self.unqualified_elements {
            options.export.element_form_default = XmlForm::Unqualified;
        }
        if self.qualified_attributes {
            options.export.attribute_form_default = XmlForm::Qualified;
        }
        debug!(?options, "session options");
        Ok(options)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Reflect(target) => {
                let options = target.session.resolve()?;
                let documents = target.input_settings.load_documents::<ReflectedModel>()?;
                let outputs = documents
                    .into_par_iter()
                    .map(|(label, mut model)| {
                        model.reindex();
                        let graph = reflect(&model, &options, &target.types, &target.include)
                            .with_context(|| format!("failed to import reflected model ({label})"))?;
                        emit(&graph, target.emit, &options).with_context(|| format!("failed to export ({label})"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                write_output(target.out.as_deref(), outputs)
            }
            Command::Schema(target) => {
                let options = target.session.resolve()?;
                let documents = target.input_settings.load_documents::<Vec<XmlSchema>>()?;
                let outputs = documents
                    .into_par_iter()
                    .map(|(label, schemas)| {
                        let set = XmlSchemaSet::from_schemas(schemas)
                            .with_context(|| format!("invalid schema set ({label})"))?;
                        let graph = import_schemas(&set, &options, &target.elements)
                            .with_context(|| format!("failed to import schema set ({label})"))?;
                        emit(&graph, target.emit, &options).with_context(|| format!("failed to export ({label})"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                write_output(target.out.as_deref(), outputs)
            }
            Command::Roundtrip(target) => {
                let options = target.session.resolve()?;
                let documents = target.input_settings.load_documents::<ReflectedModel>()?;
                let reports = documents
                    .into_par_iter()
                    .map(|(label, mut model)| {
                        model.reindex();
                        roundtrip(&model, &options, &target.types).with_context(|| format!("round trip failed ({label})"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mismatched = reports.iter().filter(|r| r.get("matches") == Some(&Value::Bool(false))).count();
                write_output(target.out.as_deref(), reports)?;
                if mismatched > 0 {
                    bail!("{mismatched} document(s) changed shape across the round trip");
                }
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn reflect(model: &ReflectedModel, options: &Options, types: &[String], include: &[String]) -> Result<MappingGraph> {
    let mut importer = ReflectionImporter::new(model, options.import.clone());
    let all_types: Vec<String>;
    let types = if types.is_empty() {
        all_types = model.types.iter().map(|t| t.name.clone()).collect();
        &all_types
    } else {
        types
    };
    for type_name in types {
        importer.import_element(type_name, None)?;
    }
    for type_name in include {
        importer.include_type(type_name)?;
    }
    Ok(importer.finish())
}

fn import_schemas(set: &XmlSchemaSet, options: &Options, elements: &[QualifiedName]) -> Result<MappingGraph> {
    let mut importer = SchemaImporter::new(set, options.import.clone());
    if elements.is_empty() {
        importer.import_all_elements()?;
    }
    for element in elements {
        importer.import_element(element)?;
    }
    Ok(importer.finish())
}

fn export(graph: &MappingGraph, options: &Options) -> Result<XmlSchemaSet> {
    let mut exporter = SchemaExporter::new(graph, options.export.clone());
    exporter.export_graph()?;
    Ok(exporter.finish())
}

fn emit(graph: &MappingGraph, emit: Emit, options: &Options) -> Result<Value> {
    let value = match emit {
        Emit::Graph => serde_json::to_value(graph.dump())?,
        Emit::Schema => serde_json::to_value(export(graph, options)?)?,
    };
    Ok(value)
}

/// Element shapes before and after export + re-import, order-insensitive.
fn roundtrip(model: &ReflectedModel, options: &Options, types: &[String]) -> Result<Value> {
    let reflected = reflect(model, options, types, &[])?;
    let set = export(&reflected, options)?;
    let reimported = import_schemas(&set, options, &[])?;

    let sorted = |mut shapes: Vec<Shape>| {
        shapes.sort_by(|a, b| a.name.cmp(&b.name));
        shapes
    };
    let before = sorted(reflected.element_shapes());
    let after = sorted(reimported.element_shapes());
    let matches = before == after;
    info!(elements = before.len(), matches, "round trip compared");
    Ok(serde_json::json!({
        "matches": matches,
        "reflected": before,
        "reimported": after,
    }))
}

fn write_output(out: Option<&Path>, mut outputs: Vec<Value>) -> Result<()> {
    let value = match outputs.len() {
        1 => outputs.remove(0),
        _ => Value::Array(outputs),
    };
    let rendered = serde_json::to_string_pretty(&value)?;
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create output directory ({})", parent.display()))?;
            }
            std::fs::write(out, &rendered).with_context(|| format!("failed to write output ({})", out.display()))?;
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_options_file() {
        let dir = std::env::temp_dir().join(format!("xsd-map-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("options.json");
        std::fs::write(&path, r#"{"import": {"recursionLimit": 4, "defaultNamespace": "urn:file"}}"#).unwrap();
        let settings = SessionSettings {
            options: Some(path),
            recursion_limit: None,
            default_namespace: Some("urn:flag".into()),
            open_model: false,
            unqualified_elements: true,
            qualified_attributes: false,
        };
        let options = settings.resolve().unwrap();
        assert_eq!(options.import.recursion_limit, 4);
        assert_eq!(options.import.default_namespace.as_deref(), Some("urn:flag"));
        assert_eq!(options.export.element_form_default, XmlForm::Unqualified);
    }

    #[test]
    fn cli_parses_repeated_elements() {
        let cli = CommandLineInterface::try_parse_from([
            "xsd-map",
            "schema",
            "-i",
            "set.json",
            "--element",
            "{urn:orders}Order",
            "--element",
            "Note",
            "--emit",
            "schema",
        ])
        .unwrap();
        let Command::Schema(target) = cli.cmd else { panic!("expected schema command") };
        assert_eq!(target.elements, vec![QualifiedName::new("Order", Some("urn:orders")), QualifiedName::local("Note")]);
        assert_eq!(target.emit, Emit::Schema);
    }
}
