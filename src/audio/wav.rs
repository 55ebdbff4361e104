/*!
 * Minimal PCM WAV encoding, header inspection and joining.
 */

use crate::errors::AudioError;

/// Sample layout from a `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavFormat {
    /// Mono 16-bit PCM
    pub fn pcm16(sample_rate: u32) -> Self {
        Self {
            audio_format: 1,
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
        }
    }

    fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample.div_ceil(8)
    }

    fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

/// Wrap raw sample data in a RIFF/WAVE container.
pub fn encode(format: WavFormat, data: &[u8]) -> Vec<u8> {
    let data_len = data.len() as u32;

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&format.audio_format.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&format.byte_rate().to_le_bytes());
    out.extend_from_slice(&format.block_align().to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Encode mono 16-bit samples as a RIFF/WAVE file.
pub fn encode_pcm16(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data: Vec<u8> = samples.iter().flat_map(|sample| sample.to_le_bytes()).collect();
    encode(WavFormat::pcm16(sample_rate), &data)
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let slice = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let slice = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Format and sample data of a WAV file, or `None` if the header is unusable.
///
/// Streaming encoders write `0xFFFFFFFF` as the data size; the remaining
/// length of the buffer is used instead.
pub fn parse(bytes: &[u8]) -> Option<(WavFormat, &[u8])> {
    if bytes.get(0..4)? != b"RIFF" || bytes.get(8..12)? != b"WAVE" {
        return None;
    }

    let mut offset = 12;
    let mut format = None;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4)?;
        let body = offset + 8;

        match id {
            b"fmt " => {
                format = Some(WavFormat {
                    audio_format: read_u16(bytes, body)?,
                    channels: read_u16(bytes, body + 2)?,
                    sample_rate: read_u32(bytes, body + 4)?,
                    bits_per_sample: read_u16(bytes, body + 14)?,
                })
            }
            b"data" => {
                let available = bytes.len() - body;
                let data_len = if size == u32::MAX { available } else { (size as usize).min(available) };
                return Some((format?, &bytes[body..body + data_len]));
            }
            _ => {}
        }
        // Chunks are padded to even sizes
        offset = body.checked_add(size as usize + (size as usize & 1))?;
    }
    None
}

/// Duration of a WAV file in milliseconds, or `None` if the header is unusable.
pub fn wav_duration_ms(bytes: &[u8]) -> Option<u64> {
    let (format, data) = parse(bytes)?;
    let rate = Some(format.byte_rate()).filter(|r| *r > 0)? as u64;
    Some(data.len() as u64 * 1000 / rate)
}

/// Join clips end to end into one file.
///
/// Every clip must share the first clip's format; nothing is resampled.
pub fn concat(clips: &[Vec<u8>]) -> Result<Vec<u8>, AudioError> {
    let mut format: Option<WavFormat> = None;
    let mut data = Vec::new();

    for (index, clip) in clips.iter().enumerate() {
        let (clip_format, samples) = parse(clip)
            .ok_or_else(|| AudioError::Validation(format!("clip {} is not a readable WAV file", index)))?;
        match format {
            None => format = Some(clip_format),
            Some(expected) if expected != clip_format => {
                return Err(AudioError::Validation(format!(
                    "clip {} has format {:?}, expected {:?}",
                    index, clip_format, expected
                )));
            }
            Some(_) => {}
        }
        data.extend_from_slice(samples);
    }

    let format = format.ok_or_else(|| AudioError::Validation("nothing to join".to_string()))?;
    Ok(encode(format, &data))
}
