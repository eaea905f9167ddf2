//! # Audio Processing
//!
//! Операции над PCM-семплами:
//!
//! - Сведение многоканального сигнала в моно
//! - Ресемплинг (Rubato, Sinc-интерполяция)
//! - Пиковая нормализация
//! - Добавление тишины в конец сигнала

use log::{debug, info, warn};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::errors::{AppError, AppResult};

/// Размер входного блока для ресемплера
const RESAMPLE_CHUNK: usize = 1024;

/// Ниже этого уровня сигнал считается тишиной и не усиливается
const SILENCE_THRESHOLD: f32 = 0.00001;

/// Переводит уровень в dBFS в линейную амплитуду.
pub fn dbfs_to_amplitude(dbfs: f32) -> f32 {
    10f32.powf(dbfs / 20.0)
}

/// Максимальная абсолютная амплитуда.
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |a, &b| a.max(b.abs()))
}

/// Сводит чередующиеся семплы в моно усреднением каналов кадра.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Меняет частоту дискретизации моно-сигнала.
///
/// Длина результата равна `round(len * to / from)`: задержка фильтра
/// отрезается, хвост дочитывается из ресемплера.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> AppResult<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AppError::AudioProcessing(format!(
            "invalid sample rates: {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected_len = (samples.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| AppError::AudioProcessing(format!("Ошибка инициализации Rubato: {}", e)))?;
    let to_err = |e: rubato::ResampleError| {
        AppError::AudioProcessing(format!("Ошибка в процессе ресемплинга: {}", e))
    };

    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected_len + delay + RESAMPLE_CHUNK);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let frames = [chunk];
        let processed = resampler.process(&frames[..], None).map_err(to_err)?;
        output.extend_from_slice(&processed[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let frames = [remainder];
        let processed = resampler
            .process_partial(Some(&frames[..]), None)
            .map_err(to_err)?;
        output.extend_from_slice(&processed[0]);
    }

    // Дочитываем то, что осталось внутри фильтра
    while output.len() < expected_len + delay {
        let processed = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(to_err)?;
        if processed[0].is_empty() {
            break;
        }
        output.extend_from_slice(&processed[0]);
    }

    let start = delay.min(output.len());
    let mut output = output.split_off(start);
    output.resize(expected_len, 0.0);

    debug!(
        "Ресемплинг {} Гц -> {} Гц: {} -> {} семплов",
        from_rate,
        to_rate,
        samples.len(),
        output.len()
    );
    Ok(output)
}

/// Масштабирует сигнал так, чтобы пик совпал с `target_peak`.
///
/// Возвращает `false` для пустого или беззвучного сигнала, он остается без изменений.
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) -> bool {
    if samples.is_empty() {
        return false;
    }

    let max_amplitude = peak_amplitude(samples);
    if max_amplitude <= SILENCE_THRESHOLD {
        warn!("Аудио содержит только нули или имеет очень низкий уровень: {:.6}", max_amplitude);
        return false;
    }

    let norm_factor = target_peak / max_amplitude;
    for sample in samples.iter_mut() {
        *sample *= norm_factor;
    }

    info!(
        "Нормализация пика: max_amplitude={:.6}, целевой уровень={:.6}, коэффициент={:.6}",
        max_amplitude, target_peak, norm_factor
    );
    true
}

/// Число кадров тишины длительностью `duration_ms` при частоте `sample_rate`.
pub fn silence_frames(sample_rate: u32, duration_ms: u32) -> usize {
    (sample_rate as u64 * duration_ms as u64 / 1000) as usize
}

/// Дописывает тишину в конец чередующегося сигнала. Возвращает число добавленных кадров.
pub fn append_silence(samples: &mut Vec<f32>, channels: u16, sample_rate: u32, duration_ms: u32) -> usize {
    let frames = silence_frames(sample_rate, duration_ms);
    samples.resize(samples.len() + frames * channels.max(1) as usize, 0.0);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbfs_to_amplitude() {
        assert!((dbfs_to_amplitude(0.0) - 1.0).abs() < 1e-6);
        assert!((dbfs_to_amplitude(-0.1) - 0.98855).abs() < 1e-4);
        assert!((dbfs_to_amplitude(-6.0) - 0.50119).abs() < 1e-4);
    }

    #[test]
    fn test_downmix_to_mono() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix_to_mono(&stereo, 2), vec![0.5, 0.5, 0.0]);

        let mono = vec![0.1, 0.2];
        assert_eq!(downmix_to_mono(&mono, 1), mono);
    }

    #[test]
    fn test_resample_length() {
        let input: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let output = resample(&input, 44100, 16000).unwrap();
        assert_eq!(output.len(), 16000);

        // Амплитуда синуса в полосе пропускания сохраняется
        let peak = peak_amplitude(&output[1000..15000]);
        assert!((peak - 0.5).abs() < 0.05, "peak = {}", peak);
    }

    #[test]
    fn test_resample_short_and_identity() {
        let short = vec![0.1f32; 300];
        assert_eq!(resample(&short, 48000, 16000).unwrap().len(), 100);
        assert_eq!(resample(&short, 16000, 16000).unwrap(), short);
        assert!(resample(&short, 0, 16000).is_err());
    }

    #[test]
    fn test_normalize_peak() {
        let mut samples = vec![-0.3, 0.1, 0.5, -0.4, 0.2];
        assert!(normalize_peak(&mut samples, 0.9));
        assert!((samples[2] - 0.9).abs() < 0.0001);
        assert!((samples[0] + 0.54).abs() < 0.0001);
    }

    #[test]
    fn test_normalize_peak_leaves_silence_alone() {
        let mut silent = vec![0.0f32; 100];
        assert!(!normalize_peak(&mut silent, 0.9));
        assert!(silent.iter().all(|&s| s == 0.0));

        let mut empty: Vec<f32> = Vec::new();
        assert!(!normalize_peak(&mut empty, 0.9));
    }

    #[test]
    fn test_append_silence() {
        let mut mono = vec![0.5f32; 10];
        assert_eq!(append_silence(&mut mono, 1, 16000, 1000), 16000);
        assert_eq!(mono.len(), 16010);
        assert!(mono[10..].iter().all(|&s| s == 0.0));

        let mut stereo = vec![0.5f32; 4];
        assert_eq!(append_silence(&mut stereo, 2, 22050, 1000), 22050);
        assert_eq!(stereo.len(), 4 + 44100);

        assert_eq!(silence_frames(44100, 250), 11025);
    }
}
