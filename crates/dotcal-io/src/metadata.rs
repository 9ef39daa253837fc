use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use dotcal_calib::center::DistortionCenter;
use dotcal_calib::model::{DistortionModel, ModelKind};

use crate::error::IoError;

/// Write a calibration result as line-oriented `key = value` text.
///
/// The file holds `xcenter`, `ycenter`, `model` and one `factor<i>` line per
/// polynomial coefficient, enough to rebuild the model without recalibrating.
///
/// # Arguments
///
/// * `file_path` - The path to the metadata file.
/// * `center` - The distortion center to record.
/// * `model` - The distortion model to record.
pub fn save_metadata(
    file_path: impl AsRef<Path>,
    center: &DistortionCenter,
    model: &DistortionModel,
) -> Result<(), IoError> {
    let mut file = File::create(file_path)?;
    writeln!(file, "xcenter = {}", center.x)?;
    writeln!(file, "ycenter = {}", center.y)?;
    let kind = match model.kind {
        ModelKind::Backward => "backward",
        ModelKind::Forward => "forward",
    };
    writeln!(file, "model = {kind}")?;
    for (i, coef) in model.coeffs.iter().enumerate() {
        writeln!(file, "factor{i} = {coef}")?;
    }
    Ok(())
}

/// Read a calibration result back from `key = value` metadata text.
///
/// Lines may appear in any order; blank lines and `#` comments are skipped
/// and unknown keys are ignored. A file without a `model` line loads as a
/// backward model.
///
/// # Arguments
///
/// * `file_path` - The path to the metadata file.
///
/// # Returns
///
/// The recorded distortion center and model.
pub fn load_metadata(
    file_path: impl AsRef<Path>,
) -> Result<(DistortionCenter, DistortionModel), IoError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(file_path)?);
    let mut xcenter = None;
    let mut ycenter = None;
    let mut kind = ModelKind::Backward;
    let mut factors: Vec<(usize, f64)> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| IoError::MetadataParseError(format!("missing '=' in {line:?}")))?;
        let (key, value) = (key.trim(), value.trim());
        match key {
            "xcenter" => xcenter = Some(parse_value(key, value)?),
            "ycenter" => ycenter = Some(parse_value(key, value)?),
            "model" => {
                kind = match value {
                    "backward" => ModelKind::Backward,
                    "forward" => ModelKind::Forward,
                    _ => {
                        return Err(IoError::MetadataParseError(format!(
                            "unknown model kind {value:?}"
                        )))
                    }
                }
            }
            _ => {
                if let Some(index) = key.strip_prefix("factor") {
                    let index = index.parse::<usize>().map_err(|_| {
                        IoError::MetadataParseError(format!("bad factor index in {key:?}"))
                    })?;
                    factors.push((index, parse_value(key, value)?));
                }
            }
        }
    }

    let x = xcenter.ok_or_else(|| IoError::MetadataParseError("missing xcenter".into()))?;
    let y = ycenter.ok_or_else(|| IoError::MetadataParseError("missing ycenter".into()))?;

    factors.sort_by_key(|&(index, _)| index);
    let contiguous = factors.iter().enumerate().all(|(i, &(index, _))| i == index);
    if factors.is_empty() || !contiguous {
        return Err(IoError::MetadataParseError(
            "factor indices must run contiguously from 0".into(),
        ));
    }
    let coeffs = factors.into_iter().map(|(_, coef)| coef).collect();

    Ok((DistortionCenter { x, y }, DistortionModel { kind, coeffs }))
}

fn parse_value(key: &str, value: &str) -> Result<f64, IoError> {
    let parsed = value
        .parse::<f64>()
        .map_err(|_| IoError::MetadataParseError(format!("bad value for {key}: {value:?}")))?;
    if !parsed.is_finite() {
        return Err(IoError::MetadataParseError(format!(
            "non-finite value for {key}: {value:?}"
        )));
    }
    Ok(parsed)
}
