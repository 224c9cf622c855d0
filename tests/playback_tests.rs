// Tests for playback chunk decoding
//
// Raw PCM and WAV cover the negotiated transports; a garbage payload checks
// that an unrecognized container fails cleanly instead of panicking.

use anyhow::Result;

use voicelink::audio::playback::{decode_chunk, decode_pcm16, decode_wav};

#[test]
fn test_pcm16_little_endian_pairs() -> Result<()> {
    let bytes = [0x34u8, 0x12, 0xFF, 0xFF, 0x00, 0x80];
    let pcm = decode_pcm16(&bytes, 24000, 1)?;

    assert_eq!(pcm.samples, vec![0x1234, -1, i16::MIN]);
    assert_eq!(pcm.sample_rate, 24000);
    assert_eq!(pcm.channels, 1);
    Ok(())
}

#[test]
fn test_pcm16_drops_trailing_odd_byte() -> Result<()> {
    let bytes = [0x01u8, 0x00, 0x02];
    let pcm = decode_pcm16(&bytes, 24000, 1)?;
    assert_eq!(pcm.samples, vec![1]);
    Ok(())
}

#[test]
fn test_pcm16_rejects_zero_rate_or_channels() {
    assert!(decode_pcm16(&[0, 0], 0, 1).is_err());
    assert!(decode_pcm16(&[0, 0], 24000, 0).is_err());
}

#[test]
fn test_pcm16_empty_payload_is_silence() -> Result<()> {
    let pcm = decode_pcm16(&[], 24000, 1)?;
    assert!(pcm.samples.is_empty());
    assert_eq!(pcm.duration_ms(), 0);
    Ok(())
}

fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let cursor = std::io::Cursor::new(&mut bytes);
        let mut writer = hound::WavWriter::new(cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

#[test]
fn test_wav_decoding_recovers_samples_and_spec() -> Result<()> {
    let samples: Vec<i16> = (0..2400).map(|i| (i % 512) as i16 - 256).collect();
    let bytes = encode_wav(&samples, 24000, 1)?;

    let pcm = decode_wav(&bytes)?;

    assert_eq!(pcm.samples, samples);
    assert_eq!(pcm.sample_rate, 24000);
    assert_eq!(pcm.channels, 1);
    assert_eq!(pcm.duration_ms(), 100);
    Ok(())
}

#[test]
fn test_wav_rejects_truncated_header() {
    assert!(decode_wav(b"RIFF").is_err());
    assert!(decode_wav(&[]).is_err());
}

#[test]
fn test_decode_chunk_dispatches_by_format_name() -> Result<()> {
    let samples = vec![10i16, -10, 20, -20];
    let raw: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    for name in ["pcm16", "pcm", "audio/pcm", ""] {
        let pcm = decode_chunk(name, &raw, 24000, 1)?;
        assert_eq!(pcm.samples, samples, "format '{name}' decodes as raw PCM");
    }

    let wav = encode_wav(&samples, 16000, 2)?;
    for name in ["wav", "WAV", "audio/wav"] {
        let pcm = decode_chunk(name, &wav, 24000, 1)?;
        assert_eq!(pcm.samples, samples);
        assert_eq!(pcm.sample_rate, 16000, "WAV header wins over declared rate");
        assert_eq!(pcm.channels, 2);
    }
    Ok(())
}

#[test]
fn test_unknown_container_garbage_fails_cleanly() {
    let garbage = [0xDEu8, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0x03];
    let result = decode_chunk("opus-ultra", &garbage, 24000, 1);
    assert!(result.is_err(), "Garbage payloads must error, never panic");
}

#[test]
fn test_duration_accounts_for_channels() {
    let pcm = voicelink::audio::DecodedPcm {
        samples: vec![0; 48000],
        sample_rate: 24000,
        channels: 2,
    };
    assert_eq!(pcm.duration_ms(), 1000);
}
