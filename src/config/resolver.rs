// src/config/resolver.rs

//! Configuration resolver: layered parameter files plus an imported sibling
//! configuration, merged once into an immutable [`Params`].

use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::{debug, info};

use crate::config::params::Params;
use crate::errors::{FiledagError, Result};
use crate::fs::FileSystem;

/// Name of a parameter file, both for the layered sources and the sibling.
pub const PARAMS_FILE_NAME: &str = "pipeline.toml";

/// Key always set to the directory holding the pipeline definition.
pub const PIPELINE_DIR_KEY: &str = "pipeline_dir";

/// Prefix of sibling keys holding paths that are made absolute on import.
pub const INTERFACE_PREFIX: &str = "interface";

/// How a sibling pipeline's configuration is imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingImport {
    /// Key in the already-merged mapping that names the sibling directory.
    pub dir_key: String,
    /// Parameter document inside that directory.
    pub document: String,
    /// Prefix applied to every imported key.
    pub prefix: String,
    /// Rewrite relative `interface*` paths to absolute paths under the
    /// sibling directory.
    pub update_interface: bool,
    /// Only import `interface*` keys.
    pub restrict_interface: bool,
}

impl SiblingImport {
    /// The annotations import every pipeline of this kind carries.
    pub fn annotations() -> Self {
        Self {
            dir_key: "annotations_dir".to_string(),
            document: PARAMS_FILE_NAME.to_string(),
            prefix: "annotations_".to_string(),
            update_interface: true,
            restrict_interface: false,
        }
    }
}

/// Everything the resolver needs to build the mapping.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Parameter files in increasing precedence. Missing files are skipped.
    pub files: Vec<PathBuf>,
    pub sibling: Option<SiblingImport>,
    /// Keys that must be present once everything is merged.
    pub required: Vec<String>,
    /// Directory of the pipeline definition, recorded under [`PIPELINE_DIR_KEY`].
    pub pipeline_dir: Option<PathBuf>,
}

/// Default layered sources: pipeline-local defaults, then the parent
/// directory, then the current directory.
pub fn default_sources(pipeline_dir: &Path) -> Vec<PathBuf> {
    vec![
        pipeline_dir.join(PARAMS_FILE_NAME),
        PathBuf::from("..").join(PARAMS_FILE_NAME),
        PathBuf::from(PARAMS_FILE_NAME),
    ]
}

/// Build the configuration mapping.
///
/// Any malformed source aborts resolution; no partial mapping is returned.
pub fn resolve(fs: &dyn FileSystem, sources: &ConfigSources) -> Result<Params> {
    let mut params = Params::new();

    for path in &sources.files {
        if !fs.exists(path) {
            debug!(path = %path.display(), "parameter file not present; skipping");
            continue;
        }
        let table = read_table(fs, path)?;
        info!(path = %path.display(), keys = table.len(), "merged parameter file");
        params.merge_table(table);
    }

    if let Some(dir) = &sources.pipeline_dir {
        params.insert(PIPELINE_DIR_KEY, dir.to_string_lossy().into_owned());
    }

    if let Some(sibling) = &sources.sibling {
        import_sibling(fs, &mut params, sibling, sources.pipeline_dir.as_deref())?;
    }

    for key in &sources.required {
        if !params.contains_key(key) {
            return Err(FiledagError::MissingKey(key.clone()));
        }
    }

    Ok(params)
}

fn read_table(fs: &dyn FileSystem, path: &Path) -> Result<Table> {
    let contents = fs.read_to_string(path)?;
    toml::from_str::<Table>(&contents).map_err(|e| {
        FiledagError::ConfigError(format!("malformed parameter file {}: {e}", path.display()))
    })
}

/// Second pass: pull the sibling's keys in under a prefix. A relative
/// sibling directory is taken relative to the pipeline directory.
fn import_sibling(
    fs: &dyn FileSystem,
    params: &mut Params,
    sibling: &SiblingImport,
    pipeline_dir: Option<&Path>,
) -> Result<()> {
    let dir = PathBuf::from(params.require_str(&sibling.dir_key)?);
    let dir = match pipeline_dir {
        Some(base) if dir.is_relative() => base.join(dir),
        _ => dir,
    };
    let document = dir.join(&sibling.document);
    if !fs.exists(&document) {
        return Err(FiledagError::ConfigError(format!(
            "sibling configuration not found at {} (from '{}')",
            document.display(),
            sibling.dir_key
        )));
    }

    let abs_dir = fs.canonicalize(&dir)?;
    let table = read_table(fs, &document)?;

    let mut imported = 0usize;
    for (key, mut value) in table {
        let is_interface = key.starts_with(INTERFACE_PREFIX);
        if sibling.restrict_interface && !is_interface {
            continue;
        }
        if sibling.update_interface && is_interface {
            absolutize(&mut value, &abs_dir);
        }
        params.insert(format!("{}{}", sibling.prefix, key), value);
        imported += 1;
    }

    params.insert(sibling.dir_key.clone(), abs_dir.to_string_lossy().into_owned());

    info!(
        dir = %abs_dir.display(),
        prefix = %sibling.prefix,
        imported,
        "imported sibling configuration"
    );
    Ok(())
}

fn absolutize(value: &mut Value, base: &Path) {
    match value {
        Value::String(s) => {
            let path = Path::new(s.as_str());
            if path.is_relative() {
                *s = base.join(path).to_string_lossy().into_owned();
            }
        }
        Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                absolutize(v, base);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn layered(fs: &MockFileSystem) -> ConfigSources {
        fs.add_file("/pipelines/rnaedit/pipeline.toml", "k = \"defaults\"\nsamtool = \"samtools\"\n");
        fs.add_file("../pipeline.toml", "k = \"parent\"\n");
        fs.add_file("pipeline.toml", "k = \"local\"\nname = \"hg38.fa\"\n");
        ConfigSources {
            files: default_sources(Path::new("/pipelines/rnaedit")),
            pipeline_dir: Some(PathBuf::from("/pipelines/rnaedit")),
            ..ConfigSources::default()
        }
    }

    #[test]
    fn later_sources_take_precedence() {
        let fs = MockFileSystem::new();
        let params = resolve(&fs, &layered(&fs)).unwrap();
        assert_eq!(params.get_str("k"), "local");
        assert_eq!(params.get_str("samtool"), "samtools");
        assert_eq!(params.get_str(PIPELINE_DIR_KEY), "/pipelines/rnaedit");
    }

    #[test]
    fn absent_sources_are_skipped() {
        let fs = MockFileSystem::new();
        fs.add_file("pipeline.toml", "k = 1\n");
        let sources = ConfigSources {
            files: default_sources(Path::new("/nowhere")),
            ..ConfigSources::default()
        };
        let params = resolve(&fs, &sources).unwrap();
        assert_eq!(params.get_int("k"), Some(1));
    }

    #[test]
    fn malformed_source_is_fatal() {
        let fs = MockFileSystem::new();
        fs.add_file("pipeline.toml", "k = = 1\n");
        let sources = ConfigSources {
            files: vec![PathBuf::from("pipeline.toml")],
            ..ConfigSources::default()
        };
        match resolve(&fs, &sources) {
            Err(FiledagError::ConfigError(msg)) => assert!(msg.contains("pipeline.toml")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn sibling_keys_are_prefixed_and_interfaces_made_absolute() {
        let fs = MockFileSystem::new();
        fs.add_file("pipeline.toml", "annotations_dir = \"/data/annotations\"\n");
        fs.add_file(
            "/data/annotations/pipeline.toml",
            "genome = \"hg38\"\ninterface_geneset = \"geneset.dir/all.gtf.gz\"\n",
        );
        let sources = ConfigSources {
            files: vec![PathBuf::from("pipeline.toml")],
            sibling: Some(SiblingImport::annotations()),
            ..ConfigSources::default()
        };

        let params = resolve(&fs, &sources).unwrap();
        assert_eq!(params.get_str("annotations_genome"), "hg38");
        assert_eq!(
            params.get_str("annotations_interface_geneset"),
            "/data/annotations/geneset.dir/all.gtf.gz"
        );
    }

    #[test]
    fn restrict_interface_imports_only_interface_keys() {
        let fs = MockFileSystem::new();
        fs.add_file("pipeline.toml", "annotations_dir = \"/data/annotations\"\n");
        fs.add_file(
            "/data/annotations/pipeline.toml",
            "genome = \"hg38\"\ninterface_geneset = \"/abs/all.gtf.gz\"\n",
        );
        let sources = ConfigSources {
            files: vec![PathBuf::from("pipeline.toml")],
            sibling: Some(SiblingImport {
                restrict_interface: true,
                ..SiblingImport::annotations()
            }),
            ..ConfigSources::default()
        };

        let params = resolve(&fs, &sources).unwrap();
        assert!(!params.contains_key("annotations_genome"));
        assert_eq!(params.get_str("annotations_interface_geneset"), "/abs/all.gtf.gz");
    }

    #[test]
    fn missing_sibling_dir_key_is_reported_by_name() {
        let fs = MockFileSystem::new();
        fs.add_file("pipeline.toml", "name = \"x\"\n");
        let sources = ConfigSources {
            files: vec![PathBuf::from("pipeline.toml")],
            sibling: Some(SiblingImport::annotations()),
            ..ConfigSources::default()
        };
        match resolve(&fs, &sources) {
            Err(FiledagError::MissingKey(key)) => assert_eq!(key, "annotations_dir"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn missing_sibling_document_is_fatal() {
        let fs = MockFileSystem::new();
        fs.add_file("pipeline.toml", "annotations_dir = \"/data/annotations\"\n");
        let sources = ConfigSources {
            files: vec![PathBuf::from("pipeline.toml")],
            sibling: Some(SiblingImport::annotations()),
            ..ConfigSources::default()
        };
        assert!(matches!(
            resolve(&fs, &sources),
            Err(FiledagError::ConfigError(_))
        ));
    }

    #[test]
    fn required_keys_are_checked_after_merge() {
        let fs = MockFileSystem::new();
        fs.add_file("pipeline.toml", "samtool = \"samtools\"\n");
        let sources = ConfigSources {
            files: vec![PathBuf::from("pipeline.toml")],
            required: vec!["samtool".into(), "name".into()],
            ..ConfigSources::default()
        };
        match resolve(&fs, &sources) {
            Err(FiledagError::MissingKey(key)) => assert_eq!(key, "name"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn relative_sibling_dir_is_taken_from_the_pipeline_dir() {
        let fs = MockFileSystem::new();
        fs.add_file("/pipelines/rnaedit/pipeline.toml", "annotations_dir = \"annotations\"\n");
        fs.add_file("/pipelines/rnaedit/annotations/pipeline.toml", "genome = \"hg38\"\n");
        let sources = ConfigSources {
            files: vec![PathBuf::from("/pipelines/rnaedit/pipeline.toml")],
            sibling: Some(SiblingImport::annotations()),
            pipeline_dir: Some(PathBuf::from("/pipelines/rnaedit")),
            ..ConfigSources::default()
        };

        let params = resolve(&fs, &sources).unwrap();
        assert_eq!(params.get_str("annotations_genome"), "hg38");
        assert_eq!(params.get_str("annotations_dir"), "/pipelines/rnaedit/annotations");
    }
}
