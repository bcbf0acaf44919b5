#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let tokens = csvdex::utils::analyze(data);
    assert!(tokens.iter().all(|t| !t.is_empty()));
    if !tokens.is_empty() {
        assert!(csvdex::utils::contains_sequence(&tokens, &tokens));
    }
});
