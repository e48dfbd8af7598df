//! Human-readable error descriptions and structured JSON error formatting.

use hydro_core::BuildError;

/// Map an eyre::Report to a short explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor => {
                "What happened: No sensor source was provided to the dosing engine.\nLikely causes: Probe initialization failed or the builder was not given a sensor.\nHow to fix: Check the I2C wiring/addresses, or run without the hardware feature to use the simulation.".to_string()
            }
            BuildError::MissingPumps => {
                "What happened: No pump actuator was provided to the dosing engine.\nLikely causes: Pump board initialization failed or the builder was not given pumps.\nHow to fix: Check the pump board wiring/addresses, or run without the hardware feature to use the simulation.".to_string()
            }
            BuildError::MissingStore => {
                "What happened: No config store was provided to the dosing engine.\nLikely causes: Assembly bug in the calling code.\nHow to fix: Pass a config store to the builder.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    // Config validation and IO errors arrive as plain reports.
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail. Original: {msg}"
    )
}

/// Stable exit codes: config/build problems are 2, everything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    let lower = err.to_string().to_lowercase();
    if lower.contains("config") || lower.contains("toml") {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": "Error",
        "message": humanize(err),
    })
    .to_string()
}
