//! Race harness runs

use faultline_core::error::FaultlineError;
use faultline_core::safe_access::NATIVE_LOAD_SITES;
use faultline_core::stress::{run, StressConfig};

#[test]
fn test_stress_survives_concurrent_unmapping()
{
    let config = StressConfig {
        iterations: 10_000,
        depth: 4,
    };

    if !NATIVE_LOAD_SITES {
        assert!(matches!(run(config), Err(FaultlineError::UnsupportedArchitecture(_))));
        return;
    }

    let report = run(config).unwrap();
    assert_eq!(report.iterations, 10_000);
    assert!(report.loads >= 2 * report.iterations);
    assert!(report.unmapped > 0);
    assert!(report.recovered_faults > 0, "{report:?}");
}

#[test]
fn test_stress_default_config()
{
    let config = StressConfig::default();
    assert_eq!(config.iterations, 10_000);
    assert_eq!(config.depth, 4);
}
