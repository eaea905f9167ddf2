//! # Audio Format Handling
//!
//! Модуль для кодирования и декодирования аудио форматов.
//!
//! - Декодирование WAV (через hound) и MP3/M4A/AAC (через Symphonia)
//! - Кодирование PCM данных в 16-битный WAV
//! - Чтение параметров WAV-файла без полного декодирования

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::errors::{AppError, AppResult};
use crate::models::AudioInfo;

/// Декодированный сигнал: семплы f32, чередующиеся по каналам
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn info(&self) -> AudioInfo {
        AudioInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames: self.frames(),
        }
    }
}

/// Декодирует аудиофайл любого поддерживаемого формата.
///
/// WAV сначала читается через hound, при неудаче (например, сжатый WAV)
/// используется Symphonia. Остальные форматы идут сразу в Symphonia.
/// Любая ошибка разбора превращается в `AppError::UnsupportedFormat`.
pub fn decode_audio_file<P: AsRef<Path>>(file_path: P) -> AppResult<DecodedAudio> {
    let file_path = file_path.as_ref();
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    if extension == "wav" {
        match decode_wav_file(file_path) {
            Ok(decoded) => return Ok(decoded),
            Err(e) => debug!("hound could not read {}: {}, trying symphonia", file_path.display(), e),
        }
    }

    let data = std::fs::read(file_path)?;
    let hint = (!extension.is_empty()).then_some(extension.as_str());
    let decoded = decode_bytes(data, hint)?;

    info!(
        "Декодировано {} семплов из {} ({} Гц, {} кан.)",
        decoded.samples.len(),
        file_path.display(),
        decoded.sample_rate,
        decoded.channels
    );
    Ok(decoded)
}

/// Декодирует данные контейнера в памяти через Symphonia.
pub fn decode_bytes(data: Vec<u8>, extension_hint: Option<&str>) -> AppResult<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AppError::UnsupportedFormat(format!("unrecognized container: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AppError::UnsupportedFormat("no audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::UnsupportedFormat(format!("no decoder for codec: {}", e)))?;

    let mut samples = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // Конец потока
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AppError::UnsupportedFormat(format!("failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(sample_buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Пропускаем проблемный пакет и продолжаем
                skipped_packets += 1;
                warn!("Ошибка декодирования пакета: {}", e);
            }
            Err(e) => {
                return Err(AppError::UnsupportedFormat(format!("decoder failure: {}", e)));
            }
        }
    }

    if skipped_packets > 0 {
        warn!("Пропущено пакетов при декодировании: {}", skipped_packets);
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(AppError::UnsupportedFormat("stream contains no audio samples".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Декодирует WAV-файл в PCM семплы (8/16/24/32 бит, целые и с плавающей точкой).
pub fn decode_wav_file<P: AsRef<Path>>(file_path: P) -> AppResult<DecodedAudio> {
    let mut reader = WavReader::open(file_path.as_ref())
        .map_err(|e| AppError::UnsupportedFormat(format!("invalid WAV: {}", e)))?;

    let spec = reader.spec();
    let to_unsupported = |e: hound::Error| AppError::UnsupportedFormat(format!("invalid WAV data: {}", e));

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(to_unsupported)?
        }
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(to_unsupported)?,
        _ => {
            return Err(AppError::UnsupportedFormat(format!(
                "Неподдерживаемый формат WAV: {:?}, {} бит",
                spec.sample_format, spec.bits_per_sample
            )));
        }
    };

    if samples.is_empty() {
        return Err(AppError::UnsupportedFormat("WAV file contains no samples".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Кодирует чередующиеся семплы в 16-битный PCM WAV.
///
/// Семплы за пределами [-1.0, 1.0] обрезаются.
pub fn encode_wav_pcm16<P: AsRef<Path>>(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
    output_path: P,
) -> AppResult<AudioInfo> {
    let output_path = output_path.as_ref();
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(output_path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    let info = AudioInfo {
        sample_rate,
        channels,
        frames: samples.len() / channels.max(1) as usize,
    };
    debug!(
        "Сохранен WAV-файл: {} ({} кадров, {} Гц)",
        output_path.display(),
        info.frames,
        sample_rate
    );
    Ok(info)
}

/// Читает параметры WAV-файла из заголовка.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> AppResult<AudioInfo> {
    let reader = WavReader::open(path.as_ref())
        .map_err(|e| AppError::UnsupportedFormat(format!("invalid WAV: {}", e)))?;
    let spec = reader.spec();
    Ok(AudioInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration() as usize,
    })
}
