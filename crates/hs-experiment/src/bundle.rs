//! Bundle packaging.
//!
//! A bundle is a zip archive holding the training code. Before submission
//! each run gets its own copy of the base bundle with a JSON document
//! (hyperparameter assignment or optimizer config) embedded as a named file.

use hs_search::{HyperparameterAssignment, OptimizerConfigDocument};
use hs_types::{SweepError, SweepResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// File name an assignment is embedded under.
pub const ASSIGNMENT_FILENAME: &str = "config.json";

/// File name an optimizer document is embedded under.
pub const OPTIMIZER_PARAMS_FILENAME: &str = "hpo_params.json";

/// Location of a bundle archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleRef(PathBuf);

impl BundleRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for BundleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Embeds JSON documents into copies of a base bundle.
pub trait BundlePackager {
    /// Return a new bundle that contains everything in `base` plus
    /// `document` stored as `file_name`. `tag` distinguishes the copy.
    fn embed(
        &self,
        base: &BundleRef,
        tag: &str,
        file_name: &str,
        document: &serde_json::Value,
    ) -> SweepResult<BundleRef>;

    fn embed_assignment(
        &self,
        base: &BundleRef,
        tag: &str,
        assignment: &HyperparameterAssignment,
    ) -> SweepResult<BundleRef> {
        self.embed(base, tag, ASSIGNMENT_FILENAME, &assignment.to_json())
    }

    fn embed_optimizer_config(
        &self,
        base: &BundleRef,
        tag: &str,
        document: &OptimizerConfigDocument,
    ) -> SweepResult<BundleRef> {
        self.embed(base, tag, OPTIMIZER_PARAMS_FILENAME, &document.to_envelope()?)
    }
}

/// Writes bundle copies as `<output_dir>/<base stem>_<tag>.zip`.
#[derive(Debug, Clone)]
pub struct ZipBundlePackager {
    output_dir: PathBuf,
}

impl ZipBundlePackager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn target_path(&self, base: &BundleRef, tag: &str) -> PathBuf {
        let stem = base
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bundle");
        let tag: String = tag
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.output_dir.join(format!("{stem}_{tag}.zip"))
    }
}

impl BundlePackager for ZipBundlePackager {
    fn embed(
        &self,
        base: &BundleRef,
        tag: &str,
        file_name: &str,
        document: &serde_json::Value,
    ) -> SweepResult<BundleRef> {
        fs::create_dir_all(&self.output_dir)?;
        let target = self.target_path(base, tag);
        if target == base.path() {
            return Err(SweepError::Archive(format!(
                "refusing to overwrite base bundle {}",
                base
            )));
        }

        // Written beside the target and renamed once complete; dropping the
        // temp file on an error path removes it.
        let mut staged = tempfile::Builder::new()
            .prefix(".bundle-")
            .suffix(".zip")
            .tempfile_in(&self.output_dir)?;

        let mut archive = ZipArchive::new(File::open(base.path())?).map_err(archive_error)?;
        let mut writer = ZipWriter::new(staged.as_file_mut());

        let mut copied = 0usize;
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(archive_error)?;
            if entry.name() == file_name {
                continue;
            }
            writer.raw_copy_file(entry).map_err(archive_error)?;
            copied += 1;
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(file_name, options).map_err(archive_error)?;
        writer.write_all(serde_json::to_string_pretty(document)?.as_bytes())?;
        writer.finish().map_err(archive_error)?;
        staged.persist(&target).map_err(|err| err.error)?;

        info!(
            base = %base,
            bundle = %target.display(),
            file = file_name,
            copied,
            "bundle packaged"
        );
        Ok(BundleRef::new(target))
    }
}

/// Read a JSON document stored inside a bundle.
pub fn read_bundle_document(bundle: &BundleRef, file_name: &str) -> SweepResult<serde_json::Value> {
    let mut archive = ZipArchive::new(File::open(bundle.path())?).map_err(archive_error)?;
    let mut entry = archive.by_name(file_name).map_err(archive_error)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(serde_json::from_str(&text)?)
}

fn archive_error(err: zip::result::ZipError) -> SweepError {
    SweepError::Archive(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_search::{OptimizerConfigBuilder, ParameterSpace};
    use hs_types::ParamValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn base_bundle(dir: &Path) -> BundleRef {
        let path = dir.join("tf_model.zip");
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        writer.start_file("experiment.py", options).unwrap();
        writer.write_all(b"print('training')\n").unwrap();
        writer.start_file(ASSIGNMENT_FILENAME, options).unwrap();
        writer.write_all(b"{\"stale\": true}").unwrap();
        writer.finish().unwrap();
        BundleRef::new(path)
    }

    fn entry_names(bundle: &BundleRef) -> Vec<String> {
        let archive = ZipArchive::new(File::open(bundle.path()).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn assignment_replaces_existing_config() {
        let dir = TempDir::new().unwrap();
        let base = base_bundle(dir.path());
        let packager = ZipBundlePackager::new(dir.path().join("bundles"));

        let assignment: HyperparameterAssignment = [
            ("batch_size".to_string(), ParamValue::Integer(128)),
            ("dropout".to_string(), ParamValue::Real(0.2)),
        ]
        .into_iter()
        .collect();

        let bundle = packager.embed_assignment(&base, "run_1", &assignment).unwrap();
        assert_eq!(
            bundle.path(),
            dir.path().join("bundles").join("tf_model_run_1.zip")
        );
        assert_eq!(entry_names(&bundle), vec!["config.json", "experiment.py"]);
        assert_eq!(
            read_bundle_document(&bundle, ASSIGNMENT_FILENAME).unwrap(),
            json!({"batch_size": 128, "dropout": 0.2})
        );

        // base bundle untouched
        assert_eq!(
            read_bundle_document(&base, ASSIGNMENT_FILENAME).unwrap(),
            json!({"stale": true})
        );
    }

    #[test]
    fn optimizer_document_added_with_envelope() {
        let dir = TempDir::new().unwrap();
        let base = base_bundle(dir.path());
        let packager = ZipBundlePackager::new(dir.path().join("bundles"));

        let space = ParameterSpace::builder()
            .add_stepped_range("dropout", 0.1, 0.3, 0.1)
            .unwrap()
            .build();
        let document = OptimizerConfigBuilder::new(15)
            .with_objective("accuracy")
            .build(&space)
            .unwrap();

        let bundle = packager.embed_optimizer_config(&base, "hpo", &document).unwrap();
        assert_eq!(
            entry_names(&bundle),
            vec!["config.json", "experiment.py", "hpo_params.json"]
        );

        let stored = read_bundle_document(&bundle, OPTIMIZER_PARAMS_FILENAME).unwrap();
        assert_eq!(
            stored["hyper_parameters_optimization"]["method"]["name"],
            json!("rbfopt")
        );
    }

    #[test]
    fn tags_are_sanitized() {
        let packager = ZipBundlePackager::new("/tmp/out");
        let target = packager.target_path(&BundleRef::new("code/model.zip"), "run 1/a");
        assert_eq!(target, PathBuf::from("/tmp/out/model_run_1_a.zip"));
    }

    #[test]
    fn missing_base_bundle_is_io_error() {
        let dir = TempDir::new().unwrap();
        let packager = ZipBundlePackager::new(dir.path());
        let err = packager
            .embed(&BundleRef::new(dir.path().join("absent.zip")), "x", "a.json", &json!({}))
            .unwrap_err();
        assert!(matches!(err, SweepError::Io(_)));
    }

    #[test]
    fn corrupt_base_bundle_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        fs::write(&path, b"not a zip").unwrap();
        let out = dir.path().join("out");
        let packager = ZipBundlePackager::new(&out);
        let err = packager
            .embed(&BundleRef::new(path), "x", "a.json", &json!({}))
            .unwrap_err();
        assert!(matches!(err, SweepError::Archive(_)));
        // nothing half-written is left behind
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn failed_repackage_keeps_previous_bundle() {
        let dir = TempDir::new().unwrap();
        let base = base_bundle(dir.path());
        let out = dir.path().join("bundles");
        let packager = ZipBundlePackager::new(&out);

        let bundle = packager
            .embed(&base, "run_1", "a.json", &json!({"lr": 0.1}))
            .unwrap();

        fs::write(base.path(), b"truncated").unwrap();
        let err = packager
            .embed(&base, "run_1", "a.json", &json!({"lr": 0.2}))
            .unwrap_err();
        assert!(matches!(err, SweepError::Archive(_)));

        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
        assert_eq!(
            read_bundle_document(&bundle, "a.json").unwrap(),
            json!({"lr": 0.1})
        );
    }
}
