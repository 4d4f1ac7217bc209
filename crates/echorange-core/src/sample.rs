//! Audio sample container
//!
//! A [`SampleBuffer`] holds one mono recording (or one synthesized pulse) as
//! normalized amplitudes and converts it to and from the 16-bit PCM byte
//! contract used by audio devices and by the remote services.
//!
//! ## Representations
//!
//! - *values*: `f64` amplitudes in `[-1.0, 1.0]`
//! - *signal*: `i16` samples, `value * 2^15` truncated toward zero
//! - *data*: little-endian bytes, 2 per frame
//! - *chunks*: data split into packets of [`crate::CHUNK`] frames

use thiserror::Error;

/// Bits per quantized sample
pub const BITS_PER_SAMPLE: u32 = 16;

/// Bytes per mono frame
pub const BYTES_PER_FRAME: usize = 2;

/// Integer value corresponding to full volume (2^15)
pub const MAX_VOLUME: f64 = (1u32 << (BITS_PER_SAMPLE - 1)) as f64;

/// Errors raised while building a sample from external input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("Value {value} at frame {index} exceeds the representable volume range")]
    OutOfRange { index: usize, value: f64 },

    #[error("Byte length {0} is not a whole number of {BYTES_PER_FRAME}-byte frames")]
    PartialFrame(usize),

    #[error("Chunk {index} has byte length {len}, not a whole number of frames")]
    PartialChunk { index: usize, len: usize },
}

/// Convert a volume (0.0 to 1.0) to the matching integer amplitude
///
/// # Example
/// ```
/// use echorange_core::sample::volume_to_int;
///
/// assert_eq!(volume_to_int(0.1), 3276);
/// ```
pub fn volume_to_int(volume: f64) -> i32 {
    (volume * MAX_VOLUME) as i32
}

/// One mono recording, immutable after construction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBuffer {
    values: Vec<f64>,
}

impl SampleBuffer {
    /// Build from normalized amplitudes
    pub fn from_values(values: &[f64]) -> Result<Self, SampleError> {
        if let Some((index, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || v.abs() > 1.0)
        {
            return Err(SampleError::OutOfRange { index, value });
        }
        Ok(Self {
            values: values.to_vec(),
        })
    }

    /// Build from quantized 16-bit samples
    pub fn from_signal(signal: &[i16]) -> Self {
        Self {
            values: signal.iter().map(|&s| s as f64 / MAX_VOLUME).collect(),
        }
    }

    /// Build from little-endian PCM bytes
    pub fn from_data(data: &[u8]) -> Result<Self, SampleError> {
        if data.len() % BYTES_PER_FRAME != 0 {
            return Err(SampleError::PartialFrame(data.len()));
        }
        let signal: Vec<i16> = data
            .chunks_exact(BYTES_PER_FRAME)
            .map(|frame| i16::from_le_bytes([frame[0], frame[1]]))
            .collect();
        Ok(Self::from_signal(&signal))
    }

    /// Build from a sequence of PCM packets
    pub fn from_chunks<C: AsRef<[u8]>>(chunks: &[C]) -> Result<Self, SampleError> {
        let mut data = Vec::with_capacity(chunks.iter().map(|c| c.as_ref().len()).sum());
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk = chunk.as_ref();
            if chunk.len() % BYTES_PER_FRAME != 0 {
                return Err(SampleError::PartialChunk {
                    index,
                    len: chunk.len(),
                });
            }
            data.extend_from_slice(chunk);
        }
        Self::from_data(&data)
    }

    /// Normalized amplitudes
    pub fn to_values(&self) -> &[f64] {
        &self.values
    }

    /// Quantized samples, truncated toward zero and saturated to the i16 range
    pub fn to_signal(&self) -> Vec<i16> {
        self.values
            .iter()
            .map(|&v| (v * MAX_VOLUME).trunc() as i16)
            .collect()
    }

    /// Little-endian PCM bytes
    pub fn to_data(&self) -> Vec<u8> {
        self.to_signal()
            .into_iter()
            .flat_map(i16::to_le_bytes)
            .collect()
    }

    /// PCM packets of [`crate::CHUNK`] frames
    pub fn to_chunks(&self) -> Vec<Vec<u8>> {
        self.to_chunks_of(crate::CHUNK)
    }

    /// PCM packets of `frames` frames each, the last one possibly shorter
    pub fn to_chunks_of(&self, frames: usize) -> Vec<Vec<u8>> {
        let frames = frames.max(1);
        self.to_data()
            .chunks(frames * BYTES_PER_FRAME)
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Difference between the largest and smallest amplitude
    pub fn peak_to_peak(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let (min, max) = self
            .values
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        max - min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"\t\nE\x01\xef\xdd";
    const SIGNAL: [i16; 3] = [2569, 325, -8721];

    fn values() -> Vec<f64> {
        SIGNAL.iter().map(|&s| s as f64 / 32768.0).collect()
    }

    #[test]
    fn test_volume_to_int() {
        assert_eq!(volume_to_int(0.1), 3276);
        assert_eq!(MAX_VOLUME, 32768.0);
    }

    #[test]
    fn test_from_values() {
        let sample = SampleBuffer::from_values(&values()).unwrap();
        assert_eq!(sample.to_values(), values().as_slice());
    }

    #[test]
    fn test_from_values_out_of_range() {
        let err = SampleBuffer::from_values(&[0.5, 1.5]).unwrap_err();
        assert_eq!(
            err,
            SampleError::OutOfRange {
                index: 1,
                value: 1.5
            }
        );
        assert!(SampleBuffer::from_values(&[f64::NAN]).is_err());
    }

    #[test]
    fn test_from_signal() {
        let sample = SampleBuffer::from_signal(&SIGNAL);
        assert_eq!(sample.to_values(), values().as_slice());
    }

    #[test]
    fn test_from_data() {
        let sample = SampleBuffer::from_data(DATA).unwrap();
        assert_eq!(sample.to_signal(), SIGNAL.to_vec());
    }

    #[test]
    fn test_from_data_partial_frame() {
        assert_eq!(
            SampleBuffer::from_data(b"\x01\x02\x03"),
            Err(SampleError::PartialFrame(3))
        );
    }

    #[test]
    fn test_from_chunks() {
        let sample = SampleBuffer::from_chunks(&[DATA, DATA, DATA]).unwrap();
        assert_eq!(sample.len(), 9);
        assert_eq!(sample.to_values(), values().repeat(3).as_slice());
    }

    #[test]
    fn test_from_chunks_partial_chunk() {
        let err = SampleBuffer::from_chunks(&[&DATA[..], &DATA[..3], &DATA[3..]]).unwrap_err();
        assert_eq!(err, SampleError::PartialChunk { index: 1, len: 3 });
    }

    #[test]
    fn test_to_data() {
        assert_eq!(SampleBuffer::from_signal(&SIGNAL).to_data(), DATA);
        assert!(SampleBuffer::from_signal(&[]).to_data().is_empty());
    }

    #[test]
    fn test_to_signal_truncates_and_saturates() {
        let sample = SampleBuffer::from_values(&[0.1, -0.1, 1.0, -1.0]).unwrap();
        assert_eq!(sample.to_signal(), vec![3276, -3276, 32767, -32768]);
    }

    #[test]
    fn test_to_chunks_single() {
        let sample = SampleBuffer::from_signal(&SIGNAL.repeat(2));
        assert_eq!(sample.to_chunks(), vec![DATA.repeat(2)]);
    }

    #[test]
    fn test_split_chunks() {
        let sample = SampleBuffer::from_signal(&SIGNAL.repeat(4));
        let chunks = sample.to_chunks_of(5);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 10);
        assert_eq!(chunks[2].len(), 4);

        let sample = SampleBuffer::from_signal(&SIGNAL.repeat(10));
        let chunks = sample.to_chunks_of(5);
        assert_eq!(chunks.len(), 6);
        assert!(chunks.iter().all(|c| c.len() == 10));
    }

    #[test]
    fn test_chunks_concatenate_to_data() {
        let signal: Vec<i16> = (0..2500).map(|i| (i * 13 % 4000 - 2000) as i16).collect();
        let sample = SampleBuffer::from_signal(&signal);
        let chunks = sample.to_chunks();
        assert_eq!(chunks.len(), 2500usize.div_ceil(crate::CHUNK));
        assert_eq!(chunks.concat(), sample.to_data());
    }

    #[test]
    fn test_transformation_chain() {
        let signal = [1, -5, 6, 7, 100, 25, -15, 0, 3];
        let data = SampleBuffer::from_signal(&signal).to_data();
        let values = SampleBuffer::from_data(&data).unwrap().to_values().to_vec();
        let chunks = SampleBuffer::from_values(&values).unwrap().to_chunks();
        let result = SampleBuffer::from_chunks(&chunks).unwrap().to_signal();
        assert_eq!(result, signal.to_vec());
    }

    #[test]
    fn test_signal_round_trip_extremes() {
        let signal = [i16::MIN, -1, 0, 1, i16::MAX];
        assert_eq!(SampleBuffer::from_signal(&signal).to_signal(), signal.to_vec());
    }

    #[test]
    fn test_peak_to_peak() {
        assert_eq!(SampleBuffer::default().peak_to_peak(), 0.0);
        let sample = SampleBuffer::from_values(&[-0.25, 0.5, 0.0]).unwrap();
        assert!((sample.peak_to_peak() - 0.75).abs() < 1e-12);
    }
}
