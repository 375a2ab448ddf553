#![no_main]

use cmdprof::resolve::directive_interpreter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = directive_interpreter(line);
    }
});
