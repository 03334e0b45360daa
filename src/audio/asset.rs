//! The sound played when the room gets too loud.

use super::wav::{decode_wav, SampleStream};
use super::AudioFormat;
use hound::WavReader;
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;

/// Short filtered-noise "shh", compiled into the binary so the default
/// configuration always has something to play.
const BUNDLED_SHUSH: &[u8] = include_bytes!("../../assets/shush.wav");

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TriggerAsset {
    #[default]
    Bundled,
    File(PathBuf),
}

impl TriggerAsset {
    /// Decode the asset lazily.
    pub(crate) fn open(&self) -> Result<(AudioFormat, SampleStream), String> {
        match self {
            TriggerAsset::Bundled => decode_wav(bundled_reader()?),
            TriggerAsset::File(path) => {
                decode_wav(WavReader::open(path).map_err(|err| err.to_string())?)
            }
        }
    }

    /// Read only the header.
    pub fn header_format(&self) -> Result<AudioFormat, String> {
        let spec = match self {
            TriggerAsset::Bundled => bundled_reader()?.spec(),
            TriggerAsset::File(path) => WavReader::open(path).map_err(|err| err.to_string())?.spec(),
        };
        Ok(AudioFormat::new(spec.sample_rate, spec.channels))
    }
}

fn bundled_reader() -> Result<WavReader<Cursor<&'static [u8]>>, String> {
    WavReader::new(Cursor::new(BUNDLED_SHUSH)).map_err(|err| err.to_string())
}

impl From<PathBuf> for TriggerAsset {
    fn from(path: PathBuf) -> Self {
        TriggerAsset::File(path)
    }
}

impl fmt::Display for TriggerAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerAsset::Bundled => f.write_str("<bundled shush>"),
            TriggerAsset::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_asset_decodes() {
        let format = TriggerAsset::Bundled.header_format().unwrap();
        assert_eq!(format, AudioFormat::mono(22_050));
        let (opened, samples) = TriggerAsset::Bundled.open().unwrap();
        assert_eq!(opened, format);
        let samples: Vec<f32> = samples.map(|s| s.unwrap()).collect();
        assert!(samples.len() > 10_000);
        assert!(samples.iter().any(|s| s.abs() > 0.05));
    }

    #[test]
    fn missing_file_is_reported() {
        let asset = TriggerAsset::from(PathBuf::from("/nonexistent/shush.wav"));
        assert!(asset.header_format().is_err());
        assert!(asset.open().is_err());
        assert_eq!(asset.to_string(), "/nonexistent/shush.wav");
    }
}
