// Integration tests for trimming sources into the library
//
// Lossless exports go through the real CAF encoder. Compressed exports use a
// stand-in encoder factory that records the settings it was given.

mod common;

use anyhow::Result;
use common::{write_tone_wav, write_tone_wav_24, FailingEncoders, Fixture, PcmStandInEncoders};
use field_session::audio::{AudioFile, CodecEncoders, EncoderFactory, PcmAudio, PcmSamples};
use field_session::quality::EncoderFormat;
use field_session::{QualityTier, SoundCategory, TrimError, TrimRequest, Trimmer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

async fn trimmer(fixture: &Fixture, encoders: Arc<dyn EncoderFactory>) -> Result<Trimmer> {
    Ok(Trimmer::new(
        fixture.library().await?,
        encoders,
        Arc::new(fixture.device.clone()),
        fixture.route.clone(),
    ))
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

fn entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        found.push(entry?.path());
    }
    found.sort();
    Ok(found)
}

#[tokio::test]
async fn test_full_range_lossless_is_sample_exact() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    let samples = write_tone_wav(&source, 48000, 2, 1.0)?;

    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    let info = trimmer.probe(&source).await?;
    assert_eq!(info.sample_rate, 48000);
    assert_eq!(info.channels, 2);

    let request = TrimRequest::new(&source, Duration::ZERO, info.duration, "Take", SoundCategory::Ambience);
    let outcome = trimmer.trim(request).await?;

    assert_eq!(outcome.path, fixture.store.root().join("AMBIENT/Take.caf"));
    assert_eq!(outcome.tier, QualityTier::Lossless);

    let written = AudioFile::open(&outcome.path)?;
    assert_eq!(written.sample_rate, 48000);
    assert_eq!(written.channels, 2);
    assert!(written.samples == samples, "lossless export must match the source sample for sample");
    Ok(())
}

#[tokio::test]
async fn test_lossless_keeps_24_bit_source() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("deep.wav");
    let samples = write_tone_wav_24(&source, 48000, 2, 1.0)?;

    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    let info = trimmer.probe(&source).await?;
    let request = TrimRequest::new(&source, Duration::ZERO, info.duration, "Deep", SoundCategory::Ambience);
    let outcome = trimmer.trim(request).await?;

    let written = PcmAudio::open(&outcome.path)?;
    assert_eq!(written.sample_rate, 48000);
    assert_eq!(written.channels, 2);
    assert!(
        written.samples == PcmSamples::Int24(samples),
        "24-bit source must keep its low byte"
    );
    Ok(())
}

#[tokio::test]
async fn test_name_is_trimmed_for_file_and_option() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 2.0)?;

    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    let outcome = trimmer
        .trim(TrimRequest::new(&source, secs(0.0), secs(1.0), "  Rain ", SoundCategory::Ambience))
        .await?;

    assert_eq!(outcome.path, fixture.store.root().join("AMBIENT/Rain.caf"));
    assert_eq!(outcome.option.name, "Rain");
    Ok(())
}

#[tokio::test]
async fn test_inner_range_duration() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 5.0)?;

    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    let request = TrimRequest::new(&source, secs(1.0), secs(3.0), "Middle", SoundCategory::Chime);
    let outcome = trimmer.trim(request).await?;

    assert!((outcome.duration.as_secs_f64() - 2.0).abs() < 0.01);
    assert_eq!(outcome.path, fixture.store.root().join("CHIMES/Middle.caf"));

    let written = AudioFile::open(&outcome.path)?;
    assert_eq!(written.samples.len(), 88200);

    // The export becomes the selected chime
    let library = fixture.library().await?;
    let snapshot = library.snapshot();
    assert!(snapshot.chime_options.iter().any(|o| o.name == "Middle"));
    assert_eq!(snapshot.selected_chime.name, "Middle");
    Ok(())
}

#[tokio::test]
async fn test_invalid_range_writes_nothing() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 5.0)?;

    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    for (start, end) in [(3.0, 2.0), (2.0, 2.0), (1.0, 6.0)] {
        let request = TrimRequest::new(&source, secs(start), secs(end), "Bad", SoundCategory::Ambience);
        let result = trimmer.trim(request).await;
        assert!(
            matches!(result, Err(TrimError::InvalidRange { .. })),
            "{}..{} should be rejected, got {:?}",
            start,
            end,
            result
        );
    }

    assert!(entries(&fixture.store.root().join("AMBIENT"))?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_same_name_replaces_previous_export() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 5.0)?;

    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    let first = trimmer
        .trim(TrimRequest::new(&source, secs(0.0), secs(1.0), "Rain", SoundCategory::Ambience))
        .await?;
    let second = trimmer
        .trim(TrimRequest::new(&source, secs(0.0), secs(2.0), "Rain", SoundCategory::Ambience))
        .await?;

    assert_eq!(first.path, second.path);
    assert_eq!(first.option.id, second.option.id);
    assert_eq!(AudioFile::open(&second.path)?.samples.len(), 88200);
    assert_eq!(entries(&fixture.store.root().join("AMBIENT"))?, vec![second.path.clone()]);
    Ok(())
}

#[tokio::test]
async fn test_compressed_export_conforms_layout() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Compressed)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 48000, 2, 2.0)?;

    let encoders = Arc::new(PcmStandInEncoders::default());
    let trimmer = trimmer(&fixture, encoders.clone()).await?;
    let outcome = trimmer
        .trim(TrimRequest::new(&source, secs(0.5), secs(1.5), "Surf", SoundCategory::Ambience))
        .await?;

    assert_eq!(outcome.tier, QualityTier::Compressed);
    assert_eq!(outcome.path, fixture.store.root().join("AMBIENT/Surf.m4a"));
    assert!((outcome.duration.as_secs_f64() - 1.0).abs() < 0.01);

    let requests = encoders.requests();
    assert_eq!(requests.len(), 1);
    let (written_to, settings) = &requests[0];
    assert_eq!(settings.format, EncoderFormat::Aac);
    assert_eq!(settings.sample_rate, 44100);
    assert_eq!(settings.channels, 1);
    assert!(
        written_to.file_name().is_some_and(|n| n.to_string_lossy().starts_with('.')),
        "encoder should write to a hidden partial file first"
    );

    // Only the finished file remains
    assert_eq!(entries(&fixture.store.root().join("AMBIENT"))?, vec![outcome.path.clone()]);
    Ok(())
}

#[tokio::test]
async fn test_encoder_failure_leaves_no_file() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 2.0)?;

    let trimmer = trimmer(&fixture, Arc::new(FailingEncoders)).await?;
    let result = trimmer
        .trim(TrimRequest::new(&source, secs(0.0), secs(1.0), "Doomed", SoundCategory::Ambience))
        .await;

    assert!(matches!(result, Err(TrimError::Export(_))), "unexpected result: {:?}", result);
    assert!(entries(&fixture.store.root().join("AMBIENT"))?.is_empty());

    let library = fixture.library().await?;
    assert!(library.snapshot().ambience_options.iter().all(|o| o.name != "Doomed"));
    Ok(())
}

#[tokio::test]
async fn test_failed_overwrite_keeps_previous_file() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 2.0)?;

    let good = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    let kept = good
        .trim(TrimRequest::new(&source, secs(0.0), secs(1.0), "Rain", SoundCategory::Ambience))
        .await?;

    let failing = trimmer(&fixture, Arc::new(FailingEncoders)).await?;
    let result = failing
        .trim(TrimRequest::new(&source, secs(0.0), secs(2.0), "Rain", SoundCategory::Ambience))
        .await;
    assert!(matches!(result, Err(TrimError::Export(_))));

    assert_eq!(AudioFile::open(&kept.path)?.samples.len(), 44100);
    assert_eq!(entries(&fixture.store.root().join("AMBIENT"))?, vec![kept.path.clone()]);
    Ok(())
}

#[tokio::test]
async fn test_bad_source_and_name() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;

    let missing = fixture.path("missing.wav");
    assert!(matches!(
        trimmer.probe(&missing).await,
        Err(TrimError::SourceUnavailable(_))
    ));

    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 1.0)?;
    let result = trimmer
        .trim(TrimRequest::new(&source, secs(0.0), secs(1.0), "../outside", SoundCategory::Ambience))
        .await;
    assert!(matches!(result, Err(TrimError::Export(_))));
    assert!(!fixture.store.root().join("outside.caf").exists());
    Ok(())
}

#[tokio::test]
async fn test_trim_stops_running_preview() -> Result<()> {
    let fixture = Fixture::new(QualityTier::Lossless)?;
    let source = fixture.path("take.wav");
    write_tone_wav(&source, 44100, 1, 5.0)?;

    let trimmer = trimmer(&fixture, Arc::new(CodecEncoders::default())).await?;
    trimmer.start_preview(&source, secs(0.0), secs(5.0)).await?;
    assert!(trimmer.is_previewing().await);
    assert_eq!(fixture.device.live_handles(), 1);

    // A second preview replaces the first
    trimmer.start_preview(&source, secs(1.0), secs(5.0)).await?;
    assert_eq!(fixture.device.live_handles(), 1);

    trimmer
        .trim(TrimRequest::new(&source, secs(1.0), secs(2.0), "Clip", SoundCategory::Chime))
        .await?;
    assert!(!trimmer.is_previewing().await);
    assert_eq!(fixture.device.live_handles(), 0);
    Ok(())
}
