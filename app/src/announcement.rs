//! The recorded announcement played into an answered call.

use std::path::Path;

use log::{debug, info};
use sip_core::{Call, Transport};

/// Loads a 16-bit PCM WAV file as raw little-endian frame bytes.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<u8>, hound::Error> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    info!(
        "announcement {}: {} Hz, {} channel(s), {} bit",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let mut bytes = Vec::with_capacity(reader.len() as usize * 2);
    for sample in reader.samples::<i16>() {
        bytes.extend_from_slice(&sample?.to_le_bytes());
    }
    Ok(bytes)
}

/// Splits `data` into sends of at most `size` bytes.
pub fn chunks(data: &[u8], size: usize) -> std::slice::Chunks<'_, u8> {
    data.chunks(size.max(1))
}

/// Streams the announcement to the call's media endpoint. Returns the number
/// of datagrams sent.
pub fn play<T: Transport>(call: &mut Call<T>, data: &[u8], size: usize) -> sip_core::Result<usize> {
    let mut sent = 0;
    for chunk in chunks(data, size) {
        call.send_raw(chunk)?;
        sent += 1;
    }
    debug!("sent {} bytes in {} datagrams", data.len(), sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(name: &str, samples: &[i16]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn loads_little_endian_frames() {
        let path = write_wav("announce-load", &[1, -2, 0x1234]);
        let bytes = load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(bytes, [0x01, 0x00, 0xfe, 0xff, 0x34, 0x12]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load("/nonexistent/announcement.wav").is_err());
    }

    #[test]
    fn chunking() {
        let data = [0u8; 10];
        let sizes: Vec<usize> = chunks(&data, 4).map(<[u8]>::len).collect();
        assert_eq!(sizes, [4, 4, 2]);
        assert_eq!(chunks(&data, 0).count(), 10);
        assert_eq!(chunks(&[], 4).count(), 0);
    }
}
