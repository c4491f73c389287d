#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // TOML parsing of Config must never panic; parse and validation errors
    // are both acceptable outcomes.
    let parsed = toml::from_str::<barbot_config::Config>(data);
    if let Ok(cfg) = parsed {
        let _ = cfg.validate();
    }
});
