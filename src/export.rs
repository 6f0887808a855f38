//! Plain text output, one record per line.

use crate::keypoint::Keypoint;
use crate::matching::Match;
use crate::{Error, Result};
use std::io::Write;

/// `x y sigma [orientation]` for every keypoint.
pub fn write_keypoints<W: Write>(mut writer: W, keypoints: &[Keypoint]) -> Result<()> {
    for keypoint in keypoints {
        write!(writer, "{} {} {}", keypoint.x, keypoint.y, keypoint.sigma)?;
        if let Some(orientation) = keypoint.orientation {
            write!(writer, " {}", orientation)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// One line of `n_bin` values per sector of the descriptor `name`.
pub fn write_descriptors<W: Write>(mut writer: W, keypoint: &Keypoint, name: &str) -> Result<()> {
    let data = keypoint
        .descriptors
        .get(name)
        .ok_or_else(|| Error::UnknownDescriptor(name.to_owned()))?;
    for histogram in data.histograms().rows() {
        let line: Vec<String> = histogram.iter().map(|v| v.to_string()).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

pub fn write_matches<W: Write>(mut writer: W, matches: &[Match]) -> Result<()> {
    for m in matches {
        writeln!(writer, "{}", m)?;
    }
    Ok(())
}
