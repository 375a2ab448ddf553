#![no_main]

use cmdprof::config::ProfilerConfig;
use cmdprof::normalize::{NormalizeMode, Normalizer};
use cmdprof::samples::parse_samples;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Artifacts come from a child process; malformed ones must never panic
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(samples) = parse_samples(input) {
            let normalizer = Normalizer::new(NormalizeMode::Detailed, &ProfilerConfig::default());
            let _ = normalizer.normalize(&samples);
        }
    }
});
