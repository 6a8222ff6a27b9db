//! Segmentation backends.
//!
//! - [`ExternalSegmenter`] runs a configured inference command
//! - [`ThresholdSegmenter`] labels voxels at or above a fixed intensity
//! - [`UnconfiguredSegmenter`] fails with a configuration hint

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::error::{AdapterError, AdapterResult};
use super::nifti;
use super::Segmenter;
use crate::config::SegmentationTool;
use crate::logging::JobLogger;
use crate::models::Volume;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output_dir}";
const THRESHOLD_OUTPUT: &str = "segmentation.nii";

/// Runs an external inference tool.
///
/// The tool receives the intermediate volume and an output directory via
/// the `{input}` and `{output_dir}` placeholders in its argument list, and
/// must leave a NIfTI label volume in that directory.
#[derive(Debug, Clone)]
pub struct ExternalSegmenter {
    tool: SegmentationTool,
}

impl ExternalSegmenter {
    pub fn new(tool: SegmentationTool) -> Self {
        Self { tool }
    }

    fn build_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output_dir = output_dir.display().to_string();

        if self.tool.args.is_empty() {
            return vec![input, output_dir];
        }

        self.tool
            .args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output_dir)
            })
            .collect()
    }
}

impl Segmenter for ExternalSegmenter {
    fn segment(
        &self,
        input: &Path,
        output_dir: &Path,
        logger: &JobLogger,
    ) -> AdapterResult<PathBuf> {
        if !input.exists() {
            return Err(AdapterError::FileNotFound(input.to_path_buf()));
        }

        let args = self.build_args(input, output_dir);
        logger.command(&format!("{} {}", self.tool.program, args.join(" ")));

        let output = Command::new(&self.tool.program)
            .args(&args)
            .output()
            .map_err(|e| AdapterError::ToolFailed {
                tool: self.tool.program.clone(),
                exit_code: -1,
                message: format!("failed to start: {}", e),
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            logger.output_line(line, false);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            logger.output_line(line, true);
        }

        if !output.status.success() {
            return Err(AdapterError::ToolFailed {
                tool: self.tool.program.clone(),
                exit_code: output.status.code().unwrap_or(-1),
                message: stderr.trim().to_string(),
            });
        }

        find_label_volume(output_dir, input)
    }
}

/// First NIfTI file in `dir`, by name, other than the tool's input.
fn find_label_volume(dir: &Path, input: &Path) -> AdapterResult<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| AdapterError::io("read segmentation output", e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| AdapterError::io("read segmentation output", e))?
            .path();
        if path.is_file() && nifti::is_nifti_path(&path) && path != input {
            candidates.push(path);
        }
    }
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::OutputMissing(dir.to_path_buf()))
}

/// Built-in binary segmentation: `value >= threshold` becomes label 1.
#[derive(Debug, Clone)]
pub struct ThresholdSegmenter {
    threshold: f32,
}

impl ThresholdSegmenter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Segmenter for ThresholdSegmenter {
    fn segment(
        &self,
        input: &Path,
        output_dir: &Path,
        logger: &JobLogger,
    ) -> AdapterResult<PathBuf> {
        let volume = nifti::read_volume(input, false)?;
        let threshold = self.threshold;
        let labels = volume
            .data
            .mapv(|v| if v >= threshold { 1.0 } else { 0.0 });

        let selected = labels.iter().filter(|&&v| v > 0.0).count();
        logger.info(&format!(
            "Threshold {} selected {} of {} voxels",
            threshold,
            selected,
            labels.len()
        ));

        let path = output_dir.join(THRESHOLD_OUTPUT);
        nifti::write_volume(&Volume::new(labels).with_spacing(volume.spacing), &path)?;
        Ok(path)
    }
}

/// Stand-in for a plid whose inference command is not configured.
#[derive(Debug, Clone)]
pub struct UnconfiguredSegmenter {
    plid: String,
}

impl UnconfiguredSegmenter {
    pub fn new(plid: impl Into<String>) -> Self {
        Self { plid: plid.into() }
    }
}

impl Segmenter for UnconfiguredSegmenter {
    fn segment(&self, _input: &Path, _output_dir: &Path, _logger: &JobLogger) -> AdapterResult<PathBuf> {
        Err(AdapterError::NotConfigured(format!(
            "no segmentation tool for '{}'; set [segmentation.tools.{}] in the config",
            self.plid, self.plid
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use ndarray::Array3;
    use tempfile::tempdir;

    fn logger(dir: &Path) -> JobLogger {
        JobLogger::new("seg-test", dir.join("logs"), LogConfig::default(), None).unwrap()
    }

    fn write_input(dir: &Path) -> PathBuf {
        let path = dir.join("temp.nii");
        let data = Array3::from_shape_fn((4, 4, 4), |(x, _, _)| x as f32 * 100.0);
        nifti::write_volume(&Volume::new(data), &path).unwrap();
        path
    }

    fn shell(script: &str) -> ExternalSegmenter {
        ExternalSegmenter::new(SegmentationTool {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                script.to_string(),
                "{input}".to_string(),
                "{output_dir}".to_string(),
            ],
        })
    }

    #[test]
    fn placeholders_are_substituted() {
        let segmenter = ExternalSegmenter::new(SegmentationTool {
            program: "tool".to_string(),
            args: vec!["--in={input}".to_string(), "-o".to_string(), "{output_dir}".to_string()],
        });
        let args = segmenter.build_args(Path::new("/t/temp.nii"), Path::new("/t/seg"));
        assert_eq!(args, vec!["--in=/t/temp.nii", "-o", "/t/seg"]);

        let bare = ExternalSegmenter::new(SegmentationTool {
            program: "tool".to_string(),
            args: Vec::new(),
        });
        assert_eq!(
            bare.build_args(Path::new("a.nii"), Path::new("out")),
            vec!["a.nii", "out"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn external_tool_output_is_located() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let out = dir.path().join("seg");
        fs::create_dir_all(&out).unwrap();

        let path = shell("cp \"$0\" \"$1/labels.nii\"")
            .segment(&input, &out, &logger(dir.path()))
            .unwrap();
        assert_eq!(path, out.join("labels.nii"));
    }

    #[cfg(unix)]
    #[test]
    fn external_tool_failure_keeps_stderr() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let log = logger(dir.path());

        let err = shell("echo model crashed >&2; exit 3")
            .segment(&input, dir.path(), &log)
            .unwrap_err();

        match err {
            AdapterError::ToolFailed {
                exit_code, message, ..
            } => {
                assert_eq!(exit_code, 3);
                assert!(message.contains("model crashed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(log.get_tail().iter().any(|l| l.contains("model crashed")));
    }

    #[cfg(unix)]
    #[test]
    fn external_tool_without_output_is_reported() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());

        let err = shell("true")
            .segment(&input, dir.path(), &logger(dir.path()))
            .unwrap_err();
        assert!(matches!(err, AdapterError::OutputMissing(_)));
    }

    #[test]
    fn missing_program_is_tool_failure() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let segmenter = ExternalSegmenter::new(SegmentationTool {
            program: "holo-no-such-segmenter".to_string(),
            args: Vec::new(),
        });

        assert!(matches!(
            segmenter.segment(&input, dir.path(), &logger(dir.path())),
            Err(AdapterError::ToolFailed { exit_code: -1, .. })
        ));
    }

    #[test]
    fn threshold_segmenter_labels_voxels() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let out = dir.path().join("seg");
        fs::create_dir_all(&out).unwrap();

        let path = ThresholdSegmenter::new(200.0)
            .segment(&input, &out, &logger(dir.path()))
            .unwrap();
        let labels = nifti::read_volume(&path, false).unwrap();

        assert_eq!(labels.data[[1, 0, 0]], 0.0);
        assert_eq!(labels.data[[2, 0, 0]], 1.0);
        assert_eq!(labels.data[[3, 3, 3]], 1.0);
    }

    #[test]
    fn unconfigured_segmenter_names_plid() {
        let dir = tempdir().unwrap();
        let err = UnconfiguredSegmenter::new("kidney_segmentation")
            .segment(Path::new("x.nii"), dir.path(), &logger(dir.path()))
            .unwrap_err();
        assert!(err.to_string().contains("kidney_segmentation"));
    }
}
